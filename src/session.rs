//! Per-browser-session context and the stores that persist it between requests.
//!
//! A [`Session`] carries exactly three values: the signed-in user's claims, the anti-forgery
//! `state` issued for the pending sign-in, and the serialized token cache. Web layers load
//! it from a [`SessionStore`] at the start of a request, pass it explicitly into every
//! operation, and save it back at the end.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, SessionId},
};

/// How long a session survives without being saved, matching the 31-day lifetime of
/// permanent server-side web sessions.
pub const DEFAULT_SESSION_TTL: Duration = Duration::days(31);

/// Boxed future returned by [`SessionStore`] implementations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Server-side persistence for sessions, keyed by the id carried in the browser cookie.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Loads the session, returning `None` when the id is unknown or the session expired.
	fn load<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>>;

	/// Persists or replaces the session, restarting its lifetime.
	fn save<'a>(&'a self, id: &'a SessionId, session: Session) -> StoreFuture<'a, ()>;

	/// Removes the session, returning whether it existed.
	fn destroy<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Session data could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Explicit per-session context passed into every operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Claims of the signed-in user; set by a completed code exchange, cleared at logout.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<IdentityClaims>,
	/// Anti-forgery value issued with the most recent authorization request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	/// Serialized token cache blob.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_cache: Option<String>,
}
impl Session {
	/// Returns `true` once a user has completed sign-in.
	pub fn is_authenticated(&self) -> bool {
		self.user.is_some()
	}

	/// Records the state issued with a new authorization request, replacing any previous one.
	pub fn issue_state(&mut self, state: impl Into<String>) {
		self.state = Some(state.into());
	}

	/// Consumes the issued state when `returned` matches it.
	///
	/// A mismatch, or a callback with no issued state, leaves the session untouched.
	pub fn consume_state(&mut self, returned: Option<&str>) -> bool {
		let matches = matches!(
			(self.state.as_deref(), returned),
			(Some(issued), Some(returned)) if issued == returned
		);

		if matches {
			self.state = None;
		}

		matches
	}

	/// Drops every value, returning the session to the anonymous state.
	pub fn clear(&mut self) {
		*self = Self::default();
	}
}

/// Session plus the time it was last saved; the unit both stores keep per id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
	/// Stored session.
	pub session: Session,
	/// When the session was last saved.
	pub saved_at: OffsetDateTime,
}
impl StoredSession {
	/// Stamps `session` with the current time.
	pub fn now(session: Session) -> Self {
		Self { session, saved_at: OffsetDateTime::now_utc() }
	}

	/// Returns `true` once `ttl` has elapsed since the last save.
	pub fn is_expired(&self, ttl: Duration, now: OffsetDateTime) -> bool {
		now - self.saved_at >= ttl
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk full"));

		let source =
			StdError::source(&error).expect("Crate error should expose the store error as source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn session_serializes_to_the_three_known_keys() {
		let session = Session {
			user: Some(IdentityClaims { sub: Some("s".into()), ..Default::default() }),
			state: Some("A".into()),
			token_cache: Some("{}".into()),
		};
		let value = serde_json::to_value(&session).expect("Session should serialize.");
		let keys = value
			.as_object()
			.expect("Session should serialize to a map.")
			.keys()
			.cloned()
			.collect::<Vec<_>>();

		assert_eq!(keys, ["state", "token_cache", "user"]);

		let anonymous = serde_json::to_value(Session::default()).expect("Session should serialize.");

		assert_eq!(anonymous, serde_json::json!({}));
	}

	#[test]
	fn stored_sessions_expire_once_the_ttl_elapses() {
		let stored = StoredSession::now(Session::default());
		let ttl = Duration::minutes(30);

		assert!(!stored.is_expired(ttl, stored.saved_at + Duration::minutes(29)));
		assert!(stored.is_expired(ttl, stored.saved_at + ttl));
	}

	#[test]
	fn state_is_consumed_only_on_match() {
		let mut session = Session::default();

		assert!(!session.consume_state(Some("A")), "No issued state never matches.");

		session.issue_state("A");

		assert!(!session.consume_state(Some("B")));
		assert!(!session.consume_state(None));
		assert_eq!(session.state.as_deref(), Some("A"));
		assert!(session.consume_state(Some("A")));
		assert!(session.state.is_none());
	}
}
