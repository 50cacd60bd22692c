//! Token endpoint error classification.
//!
//! Structured OAuth fields win over body hints, which win over the HTTP status. The
//! Microsoft identity platform reports consent and MFA prompts as `interaction_required`
//! (or `consent_required`/`login_required`), which callers resolve with a fresh sign-in.

// self
use crate::error::ProviderErrorKind;

/// Classifies a token endpoint failure.
pub fn classify_token_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
	http_status: Option<u16>,
) -> ProviderErrorKind {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_text(error_description))
		.unwrap_or_else(|| classify_status(http_status))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	let matches = |candidates: &[&str]| candidates.iter().any(|c| value.eq_ignore_ascii_case(c));

	if matches(&["invalid_grant", "access_denied"]) {
		Some(ProviderErrorKind::InvalidGrant)
	} else if matches(&["invalid_client", "unauthorized_client"]) {
		Some(ProviderErrorKind::InvalidClient)
	} else if matches(&["invalid_scope", "insufficient_scope"]) {
		Some(ProviderErrorKind::InsufficientScope)
	} else if matches(&["interaction_required", "consent_required", "login_required"]) {
		Some(ProviderErrorKind::InteractionRequired)
	} else if matches(&["temporarily_unavailable", "server_error"]) {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_text(text: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = text?.to_ascii_lowercase();

	match lowered.as_str() {
		t if t.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		t if t.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		t if t.contains("insufficient_scope") || t.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		t if t.contains("interaction_required") => Some(ProviderErrorKind::InteractionRequired),
		t if t.contains("temporarily_unavailable") => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_field_wins() {
		assert_eq!(
			classify_token_error(Some("invalid_client"), Some("invalid_grant"), Some(400)),
			ProviderErrorKind::InvalidClient
		);
		assert_eq!(
			classify_token_error(Some("interaction_required"), None, Some(400)),
			ProviderErrorKind::InteractionRequired
		);
	}

	#[test]
	fn falls_back_to_description_then_status() {
		assert_eq!(
			classify_token_error(None, Some("AADSTS70008: invalid_grant, code expired"), None),
			ProviderErrorKind::InvalidGrant
		);
		assert_eq!(classify_token_error(None, None, Some(401)), ProviderErrorKind::InvalidClient);
		assert_eq!(classify_token_error(None, None, Some(503)), ProviderErrorKind::Transient);
		assert_eq!(classify_token_error(Some("unheard_of"), None, None), ProviderErrorKind::Transient);
	}
}
