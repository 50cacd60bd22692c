//! App-only acquisition through the client-credentials grant.
//!
//! Tokens are cached inside the [`AuthorityClient`] per scope fingerprint and reused until
//! they enter the preemptive window. A per-fingerprint singleflight guard makes concurrent
//! callers wait for the in-flight request instead of each calling the token endpoint.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
	authority::GrantType,
	flows::{AuthorityClient, TokenResult},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> AuthorityClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns an app-only token for `scopes`, calling the authority only when no cached
	/// token is usable.
	pub async fn acquire_token_for_client(&self, scopes: &ScopeSet) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let span = FlowSpan::new(KIND, "acquire_token_for_client");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.ensure_supported(GrantType::ClientCredentials)?;

				let key = scopes.fingerprint();
				let guard = self.flow_guard(&key);
				let _singleflight = guard.lock().await;

				if let Some(cached) = self.cached_app_token(&key) {
					return Ok(TokenResult {
						access_token: cached,
						account: None,
						id_token_claims: None,
					});
				}

				let grant = self.facade()?.client_credentials(scopes).await?;

				self.app_tokens.lock().insert(key, grant.access_token.clone());

				Ok(TokenResult {
					access_token: grant.access_token,
					account: None,
					id_token_claims: None,
				})
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	fn cached_app_token(&self, key: &str) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();
		let tokens = self.app_tokens.lock();

		tokens
			.get(key)
			.filter(|token| !self.refresh_policy.should_refresh(token, now, key))
			.cloned()
	}
}
