//! Scope modeling helpers used by cache keys and token requests.

// std
use std::{cmp::Ordering, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// OIDC scopes the authority always grants alongside a sign-in. They never take part in
/// cache matching because providers may omit them from `scope` echoes.
pub const RESERVED_SCOPES: [&str; 3] = ["offline_access", "openid", "profile"];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized (deduplicated, sorted) set of OAuth scopes with a cached fingerprint.
///
/// The fingerprint is a base64 (no padding) SHA-256 digest of the space-delimited
/// normalized form; cache keys use it so two requests for the same scopes in a different
/// order land on the same entry.
#[derive(Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	fingerprint_cache: OnceLock<String>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self::from_normalized(normalize(scopes)?))
	}

	fn from_normalized(scopes: BTreeSet<String>) -> Self {
		Self {
			scopes: Arc::from(scopes.into_iter().collect::<Vec<_>>()),
			fingerprint_cache: OnceLock::new(),
		}
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true when every non-reserved scope in `requested` is present here,
	/// compared case-insensitively.
	pub fn covers(&self, requested: &ScopeSet) -> bool {
		requested.without_reserved().iter().all(|wanted| {
			self.scopes.iter().any(|granted| granted.eq_ignore_ascii_case(wanted))
		})
	}

	/// Returns a copy with the reserved OIDC scopes removed.
	pub fn without_reserved(&self) -> ScopeSet {
		let kept = self
			.scopes
			.iter()
			.filter(|scope| !is_reserved(scope))
			.cloned()
			.collect::<BTreeSet<_>>();

		Self::from_normalized(kept)
	}

	/// Returns a copy with the reserved OIDC scopes added.
	pub fn with_reserved(&self) -> ScopeSet {
		let mut merged = self.scopes.iter().cloned().collect::<BTreeSet<_>>();

		merged.extend(RESERVED_SCOPES.iter().map(|scope| (*scope).to_owned()));

		Self::from_normalized(merged)
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Returns the normalized string representation (space-delimited).
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Stable fingerprint derived from the normalized scope list.
	pub fn fingerprint(&self) -> String {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.scopes)).clone()
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { scopes: self.scopes.clone(), fingerprint_cache: OnceLock::new() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl PartialOrd for ScopeSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ScopeSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.scopes.cmp(&other.scopes)
	}
}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.scopes)).hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

fn is_reserved(scope: &str) -> bool {
	RESERVED_SCOPES.iter().any(|reserved| reserved.eq_ignore_ascii_case(scope))
}

fn normalize<I, S>(scopes: I) -> Result<BTreeSet<String>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(set)
}

fn compute_fingerprint(scopes: &[String]) -> String {
	let digest = Sha256::digest(scopes.join(" ").as_bytes());

	STANDARD_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_and_hash_stably() {
		let lhs = ScopeSet::new(["User.Read", "Files.Read", "User.Read"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::new(["Files.Read", "User.Read"])
			.expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "Files.Read User.Read");
		assert_eq!(lhs.fingerprint(), rhs.fingerprint());
	}

	#[test]
	fn scopes_reject_whitespace_and_empty_entries() {
		assert!(matches!(
			ScopeSet::new([" profile "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn reserved_scopes_merge_and_strip() {
		let requested = ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid.");
		let merged = requested.with_reserved();

		assert_eq!(merged.normalized(), "User.Read offline_access openid profile");
		assert_eq!(merged.without_reserved(), requested);
		assert_eq!(ScopeSet::default().with_reserved().len(), RESERVED_SCOPES.len());
	}

	#[test]
	fn covers_ignores_reserved_scopes_and_case() {
		let granted = ScopeSet::from_str("user.read email openid")
			.expect("Granted scope fixture should be valid.");
		let requested = ScopeSet::from_str("User.Read offline_access")
			.expect("Requested scope fixture should be valid.");
		let wider = ScopeSet::from_str("User.Read Mail.Read")
			.expect("Wider scope fixture should be valid.");

		assert!(granted.covers(&requested));
		assert!(!granted.covers(&wider));
		assert!(granted.covers(&ScopeSet::default()));
	}
}
