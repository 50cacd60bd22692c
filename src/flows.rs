//! Token acquisition against one authority: sign-in code exchange, silent reuse and refresh
//! from a session cache, and app-only client credentials.

pub mod auth_code;
pub mod common;

mod client_credentials;
mod silent;

pub use auth_code::*;
pub use common::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AccountId, ApplicationId, IdentityClaims},
	authority::{AuthorityDescriptor, GrantType},
	cache::CachePartition,
	error::ConfigError,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{AuthorityFacade, ReqwestTransportErrorMapper, TransportErrorMapper},
};

/// Authority client specialized for the crate's reqwest transport.
pub type ReqwestAuthorityClient = AuthorityClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Token returned by any acquisition path.
#[derive(Clone, Debug)]
pub struct TokenResult {
	/// Bearer token to forward downstream.
	pub access_token: AccessToken,
	/// Account the token was issued for; `None` for app-only tokens.
	pub account: Option<AccountId>,
	/// Claims of the signed-in user, when the token is delegated.
	pub id_token_claims: Option<IdentityClaims>,
}

/// Confidential client for a single authority.
///
/// Delegated tokens live in the caller's per-session [`TokenCache`](crate::cache::TokenCache);
/// app-only tokens live inside the client and are shared by every request.
#[derive(Clone)]
pub struct AuthorityClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Transport used for every token endpoint call.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Authority endpoints and enabled grants.
	pub descriptor: AuthorityDescriptor,
	/// Registered application (client) id.
	pub client_id: ApplicationId,
	/// Client secret for confidential client authentication.
	pub client_secret: Option<String>,
	/// Redirect URI registered for the sign-in callback.
	pub redirect_uri: Url,
	/// Reuse window for cached tokens.
	pub refresh_policy: RefreshPolicy,
	app_tokens: Arc<Mutex<HashMap<String, AccessToken>>>,
	flow_guards: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> AuthorityClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over a caller-provided transport and mapper.
	pub fn with_http_client(
		descriptor: AuthorityDescriptor,
		client_id: ApplicationId,
		redirect_uri: Url,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			client_id,
			client_secret: None,
			redirect_uri,
			refresh_policy: RefreshPolicy::default(),
			app_tokens: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the reuse window (defaults to 60 seconds).
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.refresh_policy = RefreshPolicy::new(window);

		self
	}

	/// Cache partition owned by this authority and client.
	pub fn partition(&self) -> CachePartition {
		CachePartition { authority: self.descriptor.id.clone(), client_id: self.client_id.clone() }
	}

	fn facade(&self) -> Result<AuthorityFacade<C, M>> {
		AuthorityFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	fn ensure_supported(&self, grant: GrantType) -> Result<()> {
		if self.descriptor.supports(grant) {
			Ok(())
		} else {
			Err(ConfigError::UnsupportedGrant {
				authority: self.descriptor.id.to_string(),
				grant: grant.as_str(),
			}
			.into())
		}
	}

	fn flow_guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl AuthorityClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client with its own reqwest transport bounded by `timeout`.
	pub fn new(
		descriptor: AuthorityDescriptor,
		client_id: ApplicationId,
		redirect_uri: Url,
		timeout: StdDuration,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			descriptor,
			client_id,
			redirect_uri,
			ReqwestHttpClient::with_timeout(timeout)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for AuthorityClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorityClient")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}
