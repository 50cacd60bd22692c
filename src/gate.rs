//! Role-based authorization over identity claims.

// self
use crate::{_prelude::*, auth::IdentityClaims};

/// Role every signed-in user holds implicitly; it is never looked up in the claims.
pub const BASIC_USER_ACCESS: &str = "basic_user_access";

/// Role an operation requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequiredRole {
	/// [`BASIC_USER_ACCESS`]; granted to every signed-in user.
	#[default]
	Basic,
	/// An app role that must appear in the `roles` claim.
	Named(String),
}
impl RequiredRole {
	/// Builds a requirement from a role name, folding [`BASIC_USER_ACCESS`] into
	/// [`RequiredRole::Basic`].
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();

		if name == BASIC_USER_ACCESS { Self::Basic } else { Self::Named(name) }
	}

	/// Role name as it appears in claims.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Basic => BASIC_USER_ACCESS,
			Self::Named(name) => name,
		}
	}

	/// Returns `true` for the implicit role.
	pub fn is_basic(&self) -> bool {
		matches!(self, Self::Basic)
	}
}
impl Display for RequiredRole {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl From<String> for RequiredRole {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl From<&str> for RequiredRole {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<RequiredRole> for String {
	fn from(value: RequiredRole) -> Self {
		value.as_str().to_owned()
	}
}

/// Raised when a signed-in user lacks the role an operation requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("role {role} not present in id token of user")]
pub struct AuthorizationError {
	/// Missing role.
	pub role: String,
}

/// Returns `true` when `required` is the basic role or is listed in the `roles` claim.
///
/// A token without a `roles` claim only satisfies the basic role.
pub fn has_role(claims: &IdentityClaims, required: &RequiredRole) -> bool {
	match required {
		RequiredRole::Basic => true,
		RequiredRole::Named(role) => claims.has_role_claim(role),
	}
}

/// Role check with an on/off switch for deployments that do not assign app roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGate {
	/// When `false`, every role passes.
	pub enabled: bool,
}
impl RoleGate {
	/// Gate that enforces role claims.
	pub const fn enforcing() -> Self {
		Self { enabled: true }
	}

	/// Gate that lets every signed-in user through.
	pub const fn disabled() -> Self {
		Self { enabled: false }
	}

	/// Checks `claims` against `required`.
	pub fn check(
		&self,
		claims: &IdentityClaims,
		required: &RequiredRole,
	) -> Result<(), AuthorizationError> {
		if !self.enabled || has_role(claims, required) {
			return Ok(());
		}

		#[cfg(feature = "tracing")]
		tracing::info!(role = required.as_str(), "role check failed");

		Err(AuthorizationError { role: required.as_str().to_owned() })
	}
}
impl Default for RoleGate {
	fn default() -> Self {
		Self::enforcing()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn claims_with_roles(roles: Option<&[&str]>) -> IdentityClaims {
		IdentityClaims {
			roles: roles.map(|roles| roles.iter().map(|role| role.to_string()).collect()),
			..Default::default()
		}
	}

	#[test]
	fn basic_role_needs_no_claim() {
		for claims in [
			claims_with_roles(None),
			claims_with_roles(Some(&[])),
			claims_with_roles(Some(&["premium_user_access"])),
		] {
			assert!(has_role(&claims, &RequiredRole::new(BASIC_USER_ACCESS)));
		}
	}

	#[test]
	fn named_role_requires_membership() {
		let premium = RequiredRole::new("premium_user_access");

		assert!(!has_role(&claims_with_roles(None), &premium));
		assert!(!has_role(&claims_with_roles(Some(&["basic_user_access"])), &premium));
		assert!(has_role(&claims_with_roles(Some(&["premium_user_access"])), &premium));
	}

	#[test]
	fn gate_names_the_missing_role() {
		let premium = RequiredRole::new("premium_user_access");
		let err = RoleGate::enforcing()
			.check(&claims_with_roles(None), &premium)
			.expect_err("Enforcing gate should reject users without the role.");

		assert_eq!(err.to_string(), "role premium_user_access not present in id token of user");
		assert!(RoleGate::disabled().check(&claims_with_roles(None), &premium).is_ok());
	}

	#[test]
	fn required_role_round_trips_through_strings() {
		let parsed: RequiredRole =
			serde_json::from_str("\"basic_user_access\"").expect("Role should deserialize.");

		assert!(parsed.is_basic());
		assert_eq!(
			serde_json::to_string(&RequiredRole::new("admin")).expect("Role should serialize."),
			"\"admin\""
		);
	}
}
