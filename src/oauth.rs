//! Internal OAuth client facade over the `oauth2` crate.
//!
//! The facade owns a configured `oauth2` client whose token response type also captures the
//! OIDC `id_token`, drives the three grants this crate uses, maps responses into
//! [`TokenGrant`] values, and maps failures into the crate error taxonomy. Every exchange is
//! retried once when the first attempt fails at the network level; OAuth errors reported by
//! the authority are returned as-is.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
	Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AccessTokenBuilderError, ScopeSet, TokenSecret},
	authority::{self, AuthorityDescriptor, ClientAuthMethod, GrantType},
	error::{ConfigError, ProviderError, TokenResponseError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Extra token response fields captured alongside the standard OAuth fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Compact OIDC id token, present on code and refresh exchanges that include `openid`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	IdTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::TokenEndpoint {
				message: format!("HTTP client error: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => TransientError::TokenEndpoint {
				message: "HTTP client error".into(),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

/// Outcome of a successful token endpoint exchange, before it reaches a cache.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// Access token plus granted scopes and expiry.
	pub access_token: AccessToken,
	/// Refresh token, when the authority issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Raw id token, when the authority issued one.
	pub id_token: Option<String>,
}

pub(crate) struct AuthorityFacade<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> AuthorityFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &AuthorityDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client: ConfiguredClient = Client::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Redeems an authorization code; the scope parameter carries the reserved OIDC scopes.
	pub(crate) async fn exchange_code(
		&self,
		code: &str,
		scopes: &ScopeSet,
		redirect_uri: &Url,
	) -> Result<TokenGrant> {
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let redirect_url = &redirect_url;

		retry_network_once(|| async move {
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Borrowed(redirect_url))
				.add_extra_param("scope", scopes.with_reserved().normalized())
				.request_async(&handle)
				.await
				.map_err(|err| self.map_error(GrantType::AuthorizationCode, meta.take(), err))?;

			map_token_response(scopes, response)
		})
		.await
	}

	/// Redeems a refresh token for a new access token covering `scopes`.
	pub(crate) async fn refresh(&self, refresh_token: &str, scopes: &ScopeSet) -> Result<TokenGrant> {
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let refresh_secret = &refresh_secret;

		retry_network_once(|| async move {
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_refresh_token(refresh_secret);

			for scope in scopes.with_reserved().iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| self.map_error(GrantType::RefreshToken, meta.take(), err))?;

			map_token_response(scopes, response)
		})
		.await
	}

	/// Performs the client-credentials grant for app-only scopes.
	pub(crate) async fn client_credentials(&self, scopes: &ScopeSet) -> Result<TokenGrant> {
		retry_network_once(|| async move {
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for scope in scopes.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| self.map_error(GrantType::ClientCredentials, meta.take(), err))?;

			map_token_response(scopes, response)
		})
		.await
	}

	fn map_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let error = response.error().to_string();
				let error_description = response.error_description().cloned();
				let status = meta_status(meta);
				let kind = authority::classify_token_error(
					Some(&error),
					error_description.as_deref(),
					status,
				);

				ProviderError { kind, grant: grant.as_str().into(), error, error_description, status }
					.into()
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(grant, meta, error),
			RequestTokenError::Parse(error, _body) =>
				TransientError::TokenResponseParse { source: error, status: meta_status(meta) }
					.into(),
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

/// Runs `attempt`, and runs it exactly once more if the first failure was network-level.
pub(crate) async fn retry_network_once<T, F, Fut>(mut attempt: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	match attempt().await {
		Err(err) if err.is_retryable_network_failure() => {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %err, "retrying token endpoint call after network failure");

			attempt().await
		},
		result => result,
	}
}

fn map_token_response(requested: &ScopeSet, response: IdTokenResponse) -> Result<TokenGrant> {
	let expires_in =
		response.expires_in().ok_or(TokenResponseError::MissingExpiresIn)?.as_secs();
	let expires_in =
		i64::try_from(expires_in).map_err(|_| TokenResponseError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(TokenResponseError::NonPositiveExpiresIn.into());
	}

	let granted = match response.scopes() {
		Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.to_string()))
			.map_err(TokenResponseError::from)?,
		None => requested.clone(),
	};
	let access_token = AccessToken::builder(granted)
		.secret(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in))
		.build()
		.map_err(|e| -> Error {
			match e {
				AccessTokenBuilderError::ExpiryOutOfRange =>
					TokenResponseError::ExpiresInOutOfRange.into(),
				other => ConfigError::from(other).into(),
			}
		})?;

	Ok(TokenGrant {
		access_token,
		refresh_token: response.refresh_token().map(|token| TokenSecret::new(token.secret())),
		id_token: response.extra_fields().id_token.clone(),
	})
}

fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Timeout {
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::auth::AuthorityId;

	fn descriptor(method: ClientAuthMethod) -> AuthorityDescriptor {
		AuthorityDescriptor::builder(
			AuthorityId::new("contoso").expect("Failed to construct authority identifier."),
		)
		.authorization_endpoint(
			Url::parse("https://login.example.com/contoso/oauth2/v2.0/authorize")
				.expect("Failed to parse authorization endpoint URL."),
		)
		.token_endpoint(
			Url::parse("https://login.example.com/contoso/oauth2/v2.0/token")
				.expect("Failed to parse token endpoint URL."),
		)
		.support_grant(GrantType::AuthorizationCode)
		.preferred_client_auth_method(method)
		.build()
		.expect("Failed to build authority descriptor.")
	}

	#[test]
	fn builds_facade_for_each_auth_method() {
		for method in [ClientAuthMethod::ClientSecretBasic, ClientAuthMethod::ClientSecretPost] {
			let result = <AuthorityFacade>::from_descriptor(
				&descriptor(method),
				"client-id",
				Some("secret"),
				Arc::new(ReqwestHttpClient::default()),
				Arc::new(ReqwestTransportErrorMapper),
			);

			assert!(result.is_ok());
		}
	}

	#[test]
	fn id_token_field_is_optional() {
		let response: IdTokenResponse = serde_json::from_str(
			r#"{"access_token":"a","token_type":"Bearer","expires_in":3599,"ext_expires_in":3599}"#,
		)
		.expect("Token response without id_token should parse.");

		assert!(response.extra_fields().id_token.is_none());

		let grant = map_token_response(&ScopeSet::default(), response)
			.expect("Token response should map to a grant.");

		assert_eq!(grant.access_token.secret.expose(), "a");
		assert!(grant.refresh_token.is_none());
	}

	#[test]
	fn unrepresentable_lifetimes_are_response_errors() {
		let response: IdTokenResponse = serde_json::from_str(
			r#"{"access_token":"a","token_type":"bearer","expires_in":9000000000000}"#,
		)
		.expect("Token response should parse.");

		assert!(matches!(
			map_token_response(&ScopeSet::default(), response),
			Err(Error::Transient(TransientError::InvalidTokenResponse(
				TokenResponseError::ExpiresInOutOfRange
			)))
		));
	}

	#[test]
	fn granted_scopes_come_from_the_response() {
		let response: IdTokenResponse = serde_json::from_str(
			r#"{"access_token":"a","token_type":"Bearer","expires_in":60,"scope":"openid profile User.Read","refresh_token":"r","id_token":"h.p.s"}"#,
		)
		.expect("Token response should parse.");
		let requested = ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid.");
		let grant = map_token_response(&requested, response).expect("Response should map.");

		assert!(grant.access_token.scopes.contains("openid"));
		assert!(grant.access_token.scopes.covers(&requested));
		assert_eq!(grant.refresh_token.as_ref().map(TokenSecret::expose), Some("r"));
		assert_eq!(grant.id_token.as_deref(), Some("h.p.s"));
	}

	#[tokio::test]
	async fn network_failures_are_retried_exactly_once() {
		let calls = AtomicUsize::new(0);
		let result: Result<()> = retry_network_once(|| {
			calls.fetch_add(1, Ordering::SeqCst);

			async { Err(TransportError::Io(std::io::Error::other("reset")).into()) }
		})
		.await;

		assert!(matches!(result, Err(Error::Transport(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn provider_errors_are_not_retried() {
		let calls = AtomicUsize::new(0);
		let result: Result<()> = retry_network_once(|| {
			calls.fetch_add(1, Ordering::SeqCst);

			async {
				Err(ProviderError {
					kind: crate::error::ProviderErrorKind::InvalidGrant,
					grant: "refresh_token".into(),
					error: "invalid_grant".into(),
					error_description: None,
					status: Some(400),
				}
				.into())
			}
		})
		.await;

		assert!(matches!(result, Err(Error::Provider(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
