//! Identity claims extracted from OIDC id tokens.
//!
//! The id token arrives directly from the token endpoint over TLS as part of the code
//! exchange, so only its payload is decoded here; signature verification is left to the
//! provider channel.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::AccountId, error::TokenResponseError};

/// Ordered set of application role names granted to the user.
pub type RoleSet = BTreeSet<String>;

/// Typed view over the claims of a signed-in user.
///
/// Well-known claims get dedicated fields; everything else is kept verbatim in
/// [`other`](Self::other) so views can still render the full claim set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Subject identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Object identifier of the user inside the tenant.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oid: Option<String>,
	/// Tenant identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tid: Option<String>,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Sign-in name, typically an email address.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preferred_username: Option<String>,
	/// App roles assigned to the user; absent when the token carries no `roles` claim.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub roles: Option<RoleSet>,
	/// Remaining claims, untouched.
	#[serde(flatten)]
	pub other: BTreeMap<String, serde_json::Value>,
}
impl IdentityClaims {
	/// Decodes the payload segment of a compact JWT into claims.
	pub fn from_id_token(id_token: &str) -> Result<Self, TokenResponseError> {
		let payload = id_token.split('.').nth(1).ok_or_else(|| TokenResponseError::InvalidIdToken {
			reason: "expected three dot-separated segments".into(),
		})?;
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| TokenResponseError::InvalidIdToken { reason: e.to_string() })?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|e| TokenResponseError::InvalidIdToken { reason: e.to_string() })
	}

	/// Home account identifier: `<oid>.<tid>` when both are present, otherwise `sub`.
	pub fn account_id(&self) -> Result<AccountId, TokenResponseError> {
		let raw = match (&self.oid, &self.tid, &self.sub) {
			(Some(oid), Some(tid), _) => format!("{oid}.{tid}"),
			(_, _, Some(sub)) => sub.clone(),
			_ => return Err(TokenResponseError::MissingAccountClaims),
		};

		AccountId::new(raw)
			.map_err(|e| TokenResponseError::InvalidIdToken { reason: e.to_string() })
	}

	/// Returns true when the `roles` claim is present and contains `role`.
	pub fn has_role_claim(&self, role: &str) -> bool {
		self.roles.as_ref().is_some_and(|roles| roles.contains(role))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::fake_id_token;

	#[test]
	fn decodes_roles_and_preserves_unknown_claims() {
		let token = fake_id_token(
			r#"{"oid":"o-1","tid":"t-1","name":"Ada","roles":["premium_user_access","basic_user_access"],"aud":"client"}"#,
		);
		let claims = IdentityClaims::from_id_token(&token).expect("Claims should decode.");

		assert_eq!(claims.name.as_deref(), Some("Ada"));
		assert!(claims.has_role_claim("premium_user_access"));
		assert_eq!(
			claims.roles.as_ref().map(|roles| roles.iter().cloned().collect::<Vec<_>>()),
			Some(vec!["basic_user_access".to_string(), "premium_user_access".to_string()])
		);
		assert_eq!(claims.other.get("aud"), Some(&serde_json::json!("client")));
		assert_eq!(claims.account_id().expect("Account id should resolve.").as_ref(), "o-1.t-1");
	}

	#[test]
	fn missing_roles_claim_stays_absent() {
		let claims = IdentityClaims::from_id_token(&fake_id_token(r#"{"sub":"subject"}"#))
			.expect("Claims should decode.");

		assert!(claims.roles.is_none());
		assert!(!claims.has_role_claim("basic_user_access"));
		assert_eq!(claims.account_id().expect("Sub should be used.").as_ref(), "subject");

		let round_trip = serde_json::to_value(&claims).expect("Claims should serialize.");

		assert!(round_trip.get("roles").is_none());
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		assert!(matches!(
			IdentityClaims::from_id_token("not-a-jwt"),
			Err(TokenResponseError::InvalidIdToken { .. })
		));
		assert!(IdentityClaims::from_id_token("header.!!!.sig").is_err());
		assert!(matches!(
			IdentityClaims::default().account_id(),
			Err(TokenResponseError::MissingAccountClaims)
		));
	}
}
