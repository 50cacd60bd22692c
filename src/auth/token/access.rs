//! Short-lived access token values and their builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, token::secret::TokenSecret},
};

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingSecret,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the relative expiry overflows the representable instant range.
	#[error("Expiry is out of the representable range.")]
	ExpiryOutOfRange,
}

/// Bearer credential plus the metadata needed to decide whether it can be reused.
///
/// Only the enclosing [`TokenCache`](crate::cache::TokenCache) is ever persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
	/// Secret value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Scopes the provider granted.
	pub scopes: ScopeSet,
	/// Issued-at instant recorded when the token endpoint answered.
	pub issued_at: OffsetDateTime,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for the provided granted scopes.
	pub fn builder(scopes: ScopeSet) -> AccessTokenBuilder {
		AccessTokenBuilder::new(scopes)
	}

	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the token is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` when the token expires within `window` of `instant`.
	pub fn expires_within(&self, instant: OffsetDateTime, window: Duration) -> bool {
		self.expires_at - instant <= window
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("scopes", &self.scopes)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	scopes: ScopeSet,
	secret: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	fn new(scopes: ScopeSet) -> Self {
		Self { scopes, secret: None, issued_at: None, expires_at: None, expires_in: None }
	}

	/// Provides the secret value.
	pub fn secret(mut self, token: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let secret = self.secret.ok_or(AccessTokenBuilderError::MissingSecret)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(AccessTokenBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken { secret, scopes: self.scopes, issued_at, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn scopes() -> ScopeSet {
		ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let token = AccessToken::builder(scopes())
			.secret("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Builder should support relative expiry calculations.");

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert!(!token.is_expired_at(macros::datetime!(2025-01-01 00:29 UTC)));
		assert!(token.is_expired_at(macros::datetime!(2025-01-01 00:30 UTC)));
		assert!(token.expires_within(macros::datetime!(2025-01-01 00:29 UTC), Duration::minutes(5)));
	}

	#[test]
	fn builder_requires_secret_and_expiry() {
		assert_eq!(
			AccessToken::builder(scopes()).expires_in(Duration::HOUR).build().map(|_| ()),
			Err(AccessTokenBuilderError::MissingSecret)
		);
		assert_eq!(
			AccessToken::builder(scopes()).secret("s").build().map(|_| ()),
			Err(AccessTokenBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn oversized_relative_expiry_is_an_error() {
		assert_eq!(
			AccessToken::builder(scopes())
				.secret("s")
				.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
				.expires_in(Duration::seconds(9_000_000_000_000))
				.build()
				.map(|_| ()),
			Err(AccessTokenBuilderError::ExpiryOutOfRange)
		);
	}

	#[test]
	fn debug_redacts_secret() {
		let token = AccessToken::builder(scopes())
			.secret("super-secret")
			.expires_in(Duration::HOUR)
			.build()
			.expect("Token fixture should build.");

		assert!(!format!("{token:?}").contains("super-secret"));
	}
}
