//! JSON-file [`SessionStore`] mirroring server-side filesystem sessions.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::SessionId,
	session::{DEFAULT_SESSION_TTL, Session, SessionStore, StoreError, StoreFuture, StoredSession},
};

type Snapshot = HashMap<SessionId, StoredSession>;

/// Persists every session to one JSON file after each mutation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the snapshot, so a
/// crash mid-write leaves the previous snapshot intact. Sessions not saved within the TTL
/// read as missing and are dropped from the snapshot on the next save.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	ttl: Duration,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing sessions.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, ttl: DEFAULT_SESSION_TTL, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Expires sessions `ttl` after their last save instead of the default lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create session directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize session snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl SessionStore for FileStore {
	fn load<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.inner
				.read()
				.get(id)
				.filter(|stored| !stored.is_expired(self.ttl, now))
				.map(|stored| stored.session.clone()))
		})
	}

	fn save<'a>(&'a self, id: &'a SessionId, session: Session) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let stored = StoredSession::now(session);
			let mut guard = self.inner.write();

			guard.retain(|_, entry| !entry.is_expired(self.ttl, stored.saved_at));
			guard.insert(id.clone(), stored);
			self.persist_locked(&guard)
		})
	}

	fn destroy<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let existed = guard.remove(id).is_some();

			if existed {
				self.persist_locked(&guard)?;
			}

			Ok(existed)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::auth::IdentityClaims;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"oauth2_session_gate_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn sessions_survive_reopen_and_destroy_persists() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open session file store.");
		let id = SessionId::generate();
		let session = Session {
			user: Some(IdentityClaims { name: Some("Ada".into()), ..Default::default() }),
			state: None,
			token_cache: Some(r#"{"accounts":[]}"#.into()),
		};

		store.save(&id, session.clone()).await.expect("Failed to save session.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen session file store.");

		assert_eq!(reopened.load(&id).await.expect("Failed to load session."), Some(session));
		assert!(reopened.destroy(&id).await.expect("Failed to destroy session."));

		let after_destroy = FileStore::open(&path).expect("Failed to reopen session file store.");

		assert!(after_destroy.load(&id).await.expect("Failed to load session.").is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary session snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn expired_sessions_are_dropped_from_the_snapshot() {
		let path = temp_path();
		let store = FileStore::open(&path)
			.expect("Failed to open session file store.")
			.with_ttl(Duration::milliseconds(50));
		let idle = SessionId::generate();
		let active = SessionId::generate();

		store.save(&idle, Session::default()).await.expect("Failed to save session.");
		tokio::time::sleep(std::time::Duration::from_millis(120)).await;

		assert!(store.load(&idle).await.expect("Failed to load session.").is_none());

		store.save(&active, Session::default()).await.expect("Failed to save session.");

		let reopened = FileStore::open(&path).expect("Failed to reopen session file store.");

		assert!(!reopened.inner.read().contains_key(&idle));
		assert!(reopened.load(&active).await.expect("Failed to load session.").is_some());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary session snapshot {}: {e}", path.display())
		});
	}
}
