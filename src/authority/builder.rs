//! Validating builder for [`AuthorityDescriptor`].

// self
use crate::{
	_prelude::*,
	auth::AuthorityId,
	authority::{
		AuthorityDescriptor, AuthorityEndpoints, ClientAuthMethod, GrantType, SupportedGrants,
	},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AuthorityDescriptorError {
	/// Authorize endpoint is required for interactive sign-in.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory for all flows.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// At least one grant must be supported.
	#[error("Descriptor must enable at least one grant type.")]
	NoSupportedGrants,
	/// Authority URL does not end in a tenant segment.
	#[error("Authority URL {url} does not name a tenant.")]
	MissingTenant {
		/// Authority URL that failed validation.
		url: String,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`AuthorityDescriptor`] values.
#[derive(Debug)]
pub struct AuthorityDescriptorBuilder {
	id: AuthorityId,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	logout_endpoint: Option<Url>,
	supported_grants: SupportedGrants,
	preferred_client_auth_method: ClientAuthMethod,
}
impl AuthorityDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: AuthorityId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			token_endpoint: None,
			logout_endpoint: None,
			supported_grants: SupportedGrants::default(),
			preferred_client_auth_method: ClientAuthMethod::default(),
		}
	}

	/// Sets the authorize endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional end-session endpoint.
	pub fn logout_endpoint(mut self, url: Url) -> Self {
		self.logout_endpoint = Some(url);

		self
	}

	/// Marks a single grant type as supported.
	pub fn support_grant(mut self, grant: GrantType) -> Self {
		self.supported_grants = self.supported_grants.enable(grant);

		self
	}

	/// Marks multiple grants as supported.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		for grant in grants {
			self.supported_grants = self.supported_grants.enable(grant);
		}

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<AuthorityDescriptor, AuthorityDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(AuthorityDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(AuthorityDescriptorError::MissingTokenEndpoint)?;

		if self.supported_grants.is_empty() {
			return Err(AuthorityDescriptorError::NoSupportedGrants);
		}

		validate_endpoint("authorization", &authorization)?;
		validate_endpoint("token", &token)?;

		if let Some(logout) = self.logout_endpoint.as_ref() {
			validate_endpoint("logout", logout)?;
		}

		Ok(AuthorityDescriptor {
			id: self.id,
			endpoints: AuthorityEndpoints { authorization, token, logout: self.logout_endpoint },
			supported_grants: self.supported_grants,
			preferred_client_auth_method: self.preferred_client_auth_method,
		})
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), AuthorityDescriptorError> {
	if url.scheme() != "https" {
		Err(AuthorityDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Endpoint fixture should parse.")
	}

	fn builder() -> AuthorityDescriptorBuilder {
		AuthorityDescriptorBuilder::new(
			AuthorityId::new("contoso").expect("Authority fixture should be valid."),
		)
		.authorization_endpoint(url("https://login.example.com/contoso/oauth2/v2.0/authorize"))
		.token_endpoint(url("https://login.example.com/contoso/oauth2/v2.0/token"))
	}

	#[test]
	fn plain_http_endpoints_are_rejected() {
		let err = builder()
			.token_endpoint(url("http://login.example.com/contoso/oauth2/v2.0/token"))
			.support_grant(GrantType::ClientCredentials)
			.build()
			.expect_err("Plain HTTP token endpoints must be rejected.");

		assert!(matches!(err, AuthorityDescriptorError::InsecureEndpoint { endpoint: "token", .. }));

		let err = builder()
			.logout_endpoint(url("http://login.example.com/contoso/oauth2/v2.0/logout"))
			.support_grant(GrantType::AuthorizationCode)
			.build()
			.expect_err("Plain HTTP logout endpoints must be rejected.");

		assert!(matches!(err, AuthorityDescriptorError::InsecureEndpoint { endpoint: "logout", .. }));
	}

	#[test]
	fn at_least_one_grant_is_required() {
		assert_eq!(builder().build(), Err(AuthorityDescriptorError::NoSupportedGrants));
		assert!(builder().support_grant(GrantType::RefreshToken).build().is_ok());
	}
}
