//! In-process [`SessionStore`] for tests, demos, and single-instance deployments.

// self
use crate::{
	_prelude::*,
	auth::SessionId,
	session::{DEFAULT_SESSION_TTL, Session, SessionStore, StoreFuture, StoredSession},
};

type SessionMap = Arc<RwLock<HashMap<SessionId, StoredSession>>>;

/// Thread-safe session store that keeps everything in memory.
///
/// Sessions not saved within the TTL read as missing and are dropped on the next save.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	map: SessionMap,
	ttl: Duration,
}
impl MemoryStore {
	/// Creates an empty store whose sessions expire `ttl` after their last save.
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { map: Default::default(), ttl }
	}

	/// Number of stored sessions, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.map.read().len()
	}

	/// Returns `true` when no sessions are stored.
	pub fn is_empty(&self) -> bool {
		self.map.read().is_empty()
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_ttl(DEFAULT_SESSION_TTL)
	}
}
impl SessionStore for MemoryStore {
	fn load<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.map
				.read()
				.get(id)
				.filter(|stored| !stored.is_expired(self.ttl, now))
				.map(|stored| stored.session.clone()))
		})
	}

	fn save<'a>(&'a self, id: &'a SessionId, session: Session) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let stored = StoredSession::now(session);
			let mut guard = self.map.write();

			guard.retain(|_, entry| !entry.is_expired(self.ttl, stored.saved_at));
			guard.insert(id.clone(), stored);

			Ok(())
		})
	}

	fn destroy<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.map.write().remove(id).is_some()) })
	}
}
