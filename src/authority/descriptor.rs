//! Authority descriptor data structures shared by all flows.

// self
use crate::{
	_prelude::*,
	auth::AuthorityId,
	authority::{AuthorityDescriptorBuilder, AuthorityDescriptorError, GrantType, SupportedGrants},
};

/// Confidential client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by an authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityEndpoints {
	/// Authorize endpoint the browser is redirected to.
	pub authorization: Url,
	/// Token endpoint used for code, refresh, and client-credential exchanges.
	pub token: Url,
	/// Optional end-session endpoint.
	pub logout: Option<Url>,
}

/// Immutable authority descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDescriptor {
	/// Authority identifier (tenant), also part of every cache key.
	pub id: AuthorityId,
	/// Endpoint definitions.
	pub endpoints: AuthorityEndpoints,
	/// Supported grant flags.
	pub supported_grants: SupportedGrants,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl AuthorityDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: AuthorityId) -> AuthorityDescriptorBuilder {
		AuthorityDescriptorBuilder::new(id)
	}

	/// Derives a descriptor from a v2.0-style authority URL such as
	/// `https://login.microsoftonline.com/<tenant>`, enabling every grant.
	pub fn from_authority_url(authority: &Url) -> Result<Self, AuthorityDescriptorError> {
		let tenant = authority
			.path_segments()
			.and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
			.ok_or_else(|| AuthorityDescriptorError::MissingTenant {
				url: authority.to_string(),
			})?;
		let id = AuthorityId::new(tenant)
			.map_err(|_| AuthorityDescriptorError::MissingTenant { url: authority.to_string() })?;
		let endpoint = |suffix: &str| {
			let base = authority.as_str().trim_end_matches('/');

			Url::parse(&format!("{base}/oauth2/v2.0/{suffix}")).map_err(|_| {
				AuthorityDescriptorError::MissingTenant { url: authority.to_string() }
			})
		};

		Self::builder(id)
			.authorization_endpoint(endpoint("authorize")?)
			.token_endpoint(endpoint("token")?)
			.logout_endpoint(endpoint("logout")?)
			.support_grants([
				GrantType::AuthorizationCode,
				GrantType::RefreshToken,
				GrantType::ClientCredentials,
			])
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}

	/// Checks whether the descriptor supports a given grant.
	pub fn supports(&self, grant: GrantType) -> bool {
		self.supported_grants.supports(grant)
	}
}
