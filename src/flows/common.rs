//! Shared helpers for acquisition flows: the jittered reuse window and random values.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::AccessToken};

const STATE_LEN: usize = 32;

/// Decides when a cached access token is too close to expiry to hand out.
///
/// Each cache key gets a deterministic jitter subtracted from the window so tokens minted
/// together do not all refresh on the same request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
	/// Upper bound of the preemptive window.
	pub preemptive_window: Duration,
}
impl RefreshPolicy {
	/// Window applied when none is configured.
	pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(60);

	/// Creates a policy, clamping negative windows to zero.
	pub fn new(window: Duration) -> Self {
		Self { preemptive_window: if window.is_negative() { Duration::ZERO } else { window } }
	}

	/// Window for the cache key identified by `seed`, after jitter.
	pub fn effective_window<K>(&self, seed: &K) -> Duration
	where
		K: ?Sized + Hash,
	{
		self.preemptive_window.checked_sub(self.jitter(seed)).unwrap_or(Duration::ZERO)
	}

	/// Returns `true` when `token` is expired or inside the window at `now`.
	pub fn should_refresh<K>(&self, token: &AccessToken, now: OffsetDateTime, seed: &K) -> bool
	where
		K: ?Sized + Hash,
	{
		token.is_expired_at(now) || token.expires_within(now, self.effective_window(seed))
	}

	fn jitter<K>(&self, seed: &K) -> Duration
	where
		K: ?Sized + Hash,
	{
		let window_secs = self.preemptive_window.whole_seconds();

		if window_secs <= 1 {
			return Duration::ZERO;
		}

		let modulus = u64::try_from(window_secs).unwrap_or(u64::MAX);
		let mut hasher = DefaultHasher::new();

		seed.hash(&mut hasher);

		let jitter_secs = hasher.finish() % modulus;

		Duration::seconds(i64::try_from(jitter_secs).unwrap_or(i64::MAX))
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_PREEMPTIVE_WINDOW)
	}
}

/// Fresh anti-forgery value for an authorization request.
pub fn generate_state() -> String {
	random_string(STATE_LEN)
}

pub(crate) fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
