//! Silent acquisition from the session cache, falling back to the refresh-token grant.

// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, ScopeSet},
	authority::GrantType,
	cache::{CachedAccount, TokenCache},
	error::ProviderErrorKind,
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
	/// Returns a delegated token for the first account cached for this authority.
	///
	/// A cached access token is reused when its scopes cover `scopes` and it is outside the
	/// preemptive window; otherwise the account's refresh token is redeemed and the cache
	/// updated. `Ok(None)` means the user must sign in interactively: no account is cached,
	/// no refresh token is available, or the authority rejected the refresh token.
	pub async fn acquire_token_silent(
		&self,
		scopes: &ScopeSet,
		cache: &mut TokenCache,
	) -> Result<Option<TokenResult>> {
		let span = FlowSpan::new(FlowKind::Silent, "acquire_token_silent");

		obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Attempt);

		let result = span.instrument(self.acquire_token_silent_inner(scopes, cache)).await;
		let outcome = match &result {
			Ok(Some(_)) => FlowOutcome::Success,
			Ok(None) => FlowOutcome::Miss,
			Err(_) => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(FlowKind::Silent, outcome);

		result
	}

	async fn acquire_token_silent_inner(
		&self,
		scopes: &ScopeSet,
		cache: &mut TokenCache,
	) -> Result<Option<TokenResult>> {
		let Some(account) = cache.first_account(&self.descriptor.id).cloned() else {
			return Ok(None);
		};
		let partition = self.partition();
		let seed = (account.home_account_id.as_ref(), scopes.fingerprint());
		let window = self.refresh_policy.effective_window(&seed);
		let now = OffsetDateTime::now_utc();

		if let Some(token) =
			cache.find_access_token(&partition, &account.home_account_id, scopes, now, window)
		{
			return Ok(Some(TokenResult {
				access_token: token.clone(),
				account: Some(account.home_account_id),
				id_token_claims: Some(account.id_token_claims),
			}));
		}

		let Some(refresh) = cache.refresh_token(&partition, &account.home_account_id).cloned()
		else {
			return Ok(None);
		};

		self.refresh_account(scopes, cache, account, refresh.expose()).await
	}

	async fn refresh_account(
		&self,
		scopes: &ScopeSet,
		cache: &mut TokenCache,
		account: CachedAccount,
		refresh_token: &str,
	) -> Result<Option<TokenResult>> {
		const KIND: FlowKind = FlowKind::Refresh;

		self.ensure_supported(GrantType::RefreshToken)?;
		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let grant = match self.facade()?.refresh(refresh_token, scopes).await {
			Ok(grant) => grant,
			Err(Error::Provider(err))
				if matches!(
					err.kind,
					ProviderErrorKind::InvalidGrant | ProviderErrorKind::InteractionRequired
				) =>
			{
				#[cfg(feature = "tracing")]
				tracing::info!(error = %err.error, "refresh token rejected; sign-in required");

				// A dead refresh token must not be replayed on the next request.
				cache.remove_account(&account.home_account_id);
				obs::record_flow_outcome(KIND, FlowOutcome::Miss);

				return Ok(None);
			},
			Err(err) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				return Err(err);
			},
		};
		let partition = self.partition();
		let mut account = account;

		if let Some(id_token) = grant.id_token.as_deref() {
			match IdentityClaims::from_id_token(id_token) {
				Ok(claims) => {
					account.username = claims.preferred_username.clone();
					account.id_token_claims = claims;

					cache.upsert_account(account.clone());
				},
				Err(_e) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(error = %_e, "ignoring unreadable id token from refresh");
				},
			}
		}

		cache.store_access_token(&partition, &account.home_account_id, grant.access_token.clone());

		if let Some(rotated) = grant.refresh_token {
			cache.store_refresh_token(&partition, &account.home_account_id, rotated);
		}

		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		Ok(Some(TokenResult {
			access_token: grant.access_token,
			account: Some(account.home_account_id),
			id_token_claims: Some(account.id_token_claims),
		}))
	}
}
