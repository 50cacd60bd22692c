//! Interactive sign-in: authorize URL construction, code redemption, and logout URL.

// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, ScopeSet},
	authority::GrantType,
	cache::{CachedAccount, TokenCache},
	error::TokenResponseError,
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
	/// Builds the authorize URL the browser is sent to.
	///
	/// The `scope` parameter always carries `openid profile offline_access`; an empty
	/// `scopes` set therefore requests sign-in only.
	pub fn build_authorization_url(&self, scopes: &ScopeSet, state: &str) -> Url {
		let mut url = self.descriptor.endpoints.authorization.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.client_id);
		pairs.append_pair("redirect_uri", self.redirect_uri.as_str());
		pairs.append_pair("scope", &scopes.with_reserved().normalized());
		pairs.append_pair("state", state);

		drop(pairs);

		url
	}

	/// Redeems the authorization code from the sign-in callback and records the account,
	/// access token, and refresh token in `cache`.
	pub async fn exchange_code_for_token(
		&self,
		code: &str,
		scopes: &ScopeSet,
		cache: &mut TokenCache,
	) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "exchange_code_for_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.ensure_supported(GrantType::AuthorizationCode)?;

				let grant = self.facade()?.exchange_code(code, scopes, &self.redirect_uri).await?;
				let id_token = grant.id_token.as_deref().ok_or(TokenResponseError::MissingIdToken)?;
				let claims = IdentityClaims::from_id_token(id_token)?;
				let account = claims.account_id()?;
				let partition = self.partition();

				cache.upsert_account(CachedAccount {
					home_account_id: account.clone(),
					authority: self.descriptor.id.clone(),
					username: claims.preferred_username.clone(),
					id_token_claims: claims.clone(),
				});
				cache.store_access_token(&partition, &account, grant.access_token.clone());

				if let Some(refresh) = grant.refresh_token {
					cache.store_refresh_token(&partition, &account, refresh);
				}

				Ok(TokenResult {
					access_token: grant.access_token,
					account: Some(account),
					id_token_claims: Some(claims),
				})
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Authority sign-out URL that returns the browser to `post_logout_redirect_uri`, or
	/// `None` when the authority publishes no logout endpoint.
	pub fn logout_url(&self, post_logout_redirect_uri: &Url) -> Option<Url> {
		let mut url = self.descriptor.endpoints.logout.clone()?;

		url.query_pairs_mut()
			.append_pair("post_logout_redirect_uri", post_logout_redirect_uri.as_str());

		Some(url)
	}
}
