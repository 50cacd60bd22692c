//! Per-session token cache and the store that moves it in and out of a [`Session`].
//!
//! Entries are partitioned by authority and client, then keyed by account and granted
//! scopes. The cache tracks whether anything changed since it was loaded so
//! [`TokenCacheStore::save`] only rewrites the session blob when it must.

// self
use crate::{
	_prelude::*,
	auth::{
		AccessToken, AccountId, ApplicationId, AuthorityId, IdentityClaims, ScopeSet, TokenSecret,
	},
	session::{Session, StoreError},
};

/// Authority and client pair every cache entry belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachePartition {
	/// Authority that issued the tokens.
	pub authority: AuthorityId,
	/// Client the tokens were issued to.
	pub client_id: ApplicationId,
}

/// Account known to the cache, recorded at sign-in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedAccount {
	/// Home account identifier derived from the id token.
	pub home_account_id: AccountId,
	/// Authority the account signed in against.
	pub authority: AuthorityId,
	/// Sign-in name, when the id token carried one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// Claims of the most recent id token for this account.
	pub id_token_claims: IdentityClaims,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AccessTokenEntry {
	#[serde(flatten)]
	partition: CachePartition,
	home_account_id: AccountId,
	token: AccessToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RefreshTokenEntry {
	#[serde(flatten)]
	partition: CachePartition,
	home_account_id: AccountId,
	secret: TokenSecret,
}

/// Accounts, access tokens, and refresh tokens for one browser session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenCache {
	#[serde(default)]
	accounts: Vec<CachedAccount>,
	#[serde(default)]
	access_tokens: Vec<AccessTokenEntry>,
	#[serde(default)]
	refresh_tokens: Vec<RefreshTokenEntry>,
	#[serde(skip)]
	changed: bool,
}
impl TokenCache {
	/// Accounts in the order they first signed in.
	pub fn accounts(&self) -> &[CachedAccount] {
		&self.accounts
	}

	/// First account that signed in against `authority`.
	pub fn first_account(&self, authority: &AuthorityId) -> Option<&CachedAccount> {
		self.accounts.iter().find(|account| &account.authority == authority)
	}

	/// Returns `true` if the cache was modified since it was loaded or last saved.
	pub fn has_state_changed(&self) -> bool {
		self.changed
	}

	/// Reusable access token for `account` whose scopes cover `requested` and which stays
	/// valid for longer than `window` past `now`.
	pub fn find_access_token(
		&self,
		partition: &CachePartition,
		account: &AccountId,
		requested: &ScopeSet,
		now: OffsetDateTime,
		window: Duration,
	) -> Option<&AccessToken> {
		self.access_tokens
			.iter()
			.filter(|entry| &entry.partition == partition && &entry.home_account_id == account)
			.map(|entry| &entry.token)
			.filter(|token| token.scopes.covers(requested) && !token.expires_within(now, window))
			.max_by_key(|token| token.expires_at)
	}

	/// Refresh token cached for `account`.
	pub fn refresh_token(
		&self,
		partition: &CachePartition,
		account: &AccountId,
	) -> Option<&TokenSecret> {
		self.refresh_tokens
			.iter()
			.find(|entry| &entry.partition == partition && &entry.home_account_id == account)
			.map(|entry| &entry.secret)
	}

	/// Removes an account with every token cached for it. Returns `true` if anything was
	/// removed.
	pub fn remove_account(&mut self, account: &AccountId) -> bool {
		let before = self.entry_count();

		self.accounts.retain(|entry| &entry.home_account_id != account);
		self.access_tokens.retain(|entry| &entry.home_account_id != account);
		self.refresh_tokens.retain(|entry| &entry.home_account_id != account);

		let removed = before != self.entry_count();

		self.changed |= removed;

		removed
	}

	/// Serializes the cache to its JSON blob.
	pub fn to_json(&self) -> Result<String, StoreError> {
		serde_json::to_string(self).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize token cache: {e}"),
		})
	}

	/// Restores a cache from its JSON blob; the result reports no change.
	pub fn from_json(blob: &str) -> Result<Self, StoreError> {
		serde_json::from_str(blob).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse token cache: {e}"),
		})
	}

	fn entry_count(&self) -> usize {
		self.accounts.len() + self.access_tokens.len() + self.refresh_tokens.len()
	}

	pub(crate) fn upsert_account(&mut self, account: CachedAccount) {
		match self.accounts.iter_mut().find(|entry| {
			entry.home_account_id == account.home_account_id && entry.authority == account.authority
		}) {
			Some(existing) if *existing == account => return,
			Some(existing) => *existing = account,
			None => self.accounts.push(account),
		}

		self.changed = true;
	}

	/// Stores `token`, evicting expired entries and entries for the same account whose
	/// scopes overlap it.
	pub(crate) fn store_access_token(
		&mut self,
		partition: &CachePartition,
		account: &AccountId,
		token: AccessToken,
	) {
		let now = OffsetDateTime::now_utc();
		let incoming = token.scopes.without_reserved();

		self.access_tokens.retain(|entry| {
			let same_owner = &entry.partition == partition && &entry.home_account_id == account;
			let overlaps = entry.token.scopes.iter().any(|scope| incoming.contains(scope));

			!(entry.token.is_expired_at(now) || (same_owner && overlaps))
		});
		self.access_tokens.push(AccessTokenEntry {
			partition: partition.clone(),
			home_account_id: account.clone(),
			token,
		});
		self.changed = true;
	}

	pub(crate) fn store_refresh_token(
		&mut self,
		partition: &CachePartition,
		account: &AccountId,
		secret: TokenSecret,
	) {
		match self
			.refresh_tokens
			.iter_mut()
			.find(|entry| &entry.partition == partition && &entry.home_account_id == account)
		{
			Some(existing) if existing.secret == secret => return,
			Some(existing) => existing.secret = secret,
			None => self.refresh_tokens.push(RefreshTokenEntry {
				partition: partition.clone(),
				home_account_id: account.clone(),
				secret,
			}),
		}

		self.changed = true;
	}
}

/// Moves a [`TokenCache`] between requests through the session's `token_cache` value.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenCacheStore;
impl TokenCacheStore {
	/// Restores the session's cache, or an empty one when the session has none.
	///
	/// A blob that cannot be parsed is discarded: the returned cache is empty and marked
	/// changed so the next [`save`](Self::save) overwrites it.
	pub fn load(&self, session: &Session) -> TokenCache {
		let Some(blob) = session.token_cache.as_deref() else {
			return TokenCache::default();
		};

		match TokenCache::from_json(blob) {
			Ok(cache) => cache,
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "discarding unreadable token cache");

				TokenCache { changed: true, ..Default::default() }
			},
		}
	}

	/// Writes the cache back into the session when it changed since [`load`](Self::load).
	///
	/// Returns `true` when the session blob was rewritten.
	pub fn save(&self, session: &mut Session, cache: &mut TokenCache) -> Result<bool> {
		if !cache.changed {
			return Ok(false);
		}

		session.token_cache = Some(cache.to_json()?);
		cache.changed = false;

		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::scopes;

	fn partition() -> CachePartition {
		CachePartition {
			authority: AuthorityId::new("contoso").expect("Authority fixture should be valid."),
			client_id: ApplicationId::new("client").expect("Client fixture should be valid."),
		}
	}

	fn account() -> CachedAccount {
		CachedAccount {
			home_account_id: AccountId::new("oid.tid").expect("Account fixture should be valid."),
			authority: partition().authority,
			username: Some("ada@example.com".into()),
			id_token_claims: IdentityClaims::default(),
		}
	}

	fn token(scope: &str, lifetime: Duration) -> AccessToken {
		AccessToken::builder(scopes(scope))
			.secret(format!("at-{scope}"))
			.expires_in(lifetime)
			.build()
			.expect("Token fixture should build.")
	}

	#[test]
	fn save_is_a_noop_without_changes() {
		let store = TokenCacheStore;
		let mut session =
			Session { token_cache: Some(r#"{"accounts":[]}"#.into()), ..Default::default() };
		let mut cache = store.load(&session);

		assert!(!store.save(&mut session, &mut cache).expect("Save should succeed."));
		assert_eq!(session.token_cache.as_deref(), Some(r#"{"accounts":[]}"#));
	}

	#[test]
	fn accounts_survive_a_save_load_cycle() {
		let store = TokenCacheStore;
		let mut session = Session::default();
		let mut cache = store.load(&session);

		cache.upsert_account(account());
		cache.store_refresh_token(&partition(), &account().home_account_id, TokenSecret::new("rt"));

		assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));
		assert!(!cache.has_state_changed());

		let reloaded = store.load(&session);

		assert_eq!(reloaded.accounts(), cache.accounts());
		assert!(!reloaded.has_state_changed());
		assert_eq!(
			reloaded
				.refresh_token(&partition(), &account().home_account_id)
				.map(TokenSecret::expose),
			Some("rt")
		);
	}

	#[test]
	fn corrupt_blob_loads_empty_and_marks_changed() {
		let store = TokenCacheStore;
		let mut session = Session { token_cache: Some("{not json".into()), ..Default::default() };
		let mut cache = store.load(&session);

		assert!(cache.accounts().is_empty());
		assert!(cache.has_state_changed());
		assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));
		assert!(
			TokenCache::from_json(session.token_cache.as_deref().unwrap_or_default()).is_ok()
		);
	}

	#[test]
	fn access_token_lookup_honors_scopes_and_window() {
		let mut cache = TokenCache::default();
		let owner = account().home_account_id;
		let now = OffsetDateTime::now_utc();

		cache.store_access_token(&partition(), &owner, token("User.Read", Duration::HOUR));

		let hit = cache.find_access_token(
			&partition(),
			&owner,
			&scopes("user.read openid"),
			now,
			Duration::minutes(5),
		);

		assert_eq!(hit.map(|token| token.secret.expose()), Some("at-User.Read"));
		assert!(
			cache
				.find_access_token(&partition(), &owner, &scopes("Mail.Read"), now, Duration::ZERO)
				.is_none()
		);
		assert!(
			cache
				.find_access_token(
					&partition(),
					&owner,
					&scopes("User.Read"),
					now,
					Duration::HOUR * 2
				)
				.is_none(),
			"Tokens inside the preemptive window must not be reused."
		);
	}

	#[test]
	fn overlapping_tokens_are_replaced() {
		let mut cache = TokenCache::default();
		let owner = account().home_account_id;

		cache.store_access_token(&partition(), &owner, token("User.Read", Duration::HOUR));
		cache.store_access_token(
			&partition(),
			&owner,
			token("User.Read Mail.Read", Duration::HOUR),
		);

		assert_eq!(cache.access_tokens.len(), 1);
		assert!(cache.remove_account(&owner));
		assert!(cache.access_tokens.is_empty());
	}

	#[test]
	fn unchanged_upserts_do_not_mark_changed() {
		let mut cache = TokenCache::default();

		cache.upsert_account(account());
		cache.changed = false;
		cache.upsert_account(account());

		assert!(!cache.has_state_changed());
	}
}
