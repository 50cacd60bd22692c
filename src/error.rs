//! Crate-level error types shared across flows, sessions, routing, and backends.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::session::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Identity provider reported an OAuth error.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Downstream API or database call failed.
	#[error(transparent)]
	Backend(#[from] crate::backend::BackendError),
}
impl Error {
	/// Returns `true` for network-level failures that are worth one more attempt.
	pub fn is_retryable_network_failure(&self) -> bool {
		matches!(
			self,
			Error::Transport(_) | Error::Transient(TransientError::Timeout { .. })
		)
	}
}

/// Structured error reported by the identity provider's token endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Identity provider rejected the {grant} request with `{error}`.")]
pub struct ProviderError {
	/// Classified error category.
	pub kind: ProviderErrorKind,
	/// Grant label that produced the error.
	pub grant: String,
	/// OAuth `error` code.
	pub error: String,
	/// OAuth `error_description`, if supplied.
	pub error_description: Option<String>,
	/// HTTP status code, when available.
	pub status: Option<u16>,
}

/// Provider error categories derived from OAuth error codes and HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad or reused code, expired refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes are invalid or exceed what the client may request.
	InsufficientScope,
	/// The user must sign in interactively again (consent, MFA, expired session).
	InteractionRequired,
	/// Provider-side temporary failure.
	Transient,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Authority descriptor contains an invalid URL.
	#[error("Authority descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Authority descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::authority::AuthorityDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Descriptor does not enable the requested grant.
	#[error("Authority `{authority}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Authority identifier string.
		authority: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Access token builder validation failed.
	#[error("Unable to build access token.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
	/// Application settings failed validation.
	#[error("Invalid setting `{field}`: {reason}.")]
	InvalidSetting {
		/// Offending setting path.
		field: String,
		/// Human-readable reason.
		reason: String,
	},
	/// Application settings could not be parsed.
	#[error("Settings could not be parsed.")]
	SettingsParse(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Settings file could not be read.
	#[error("Settings file could not be read.")]
	SettingsIo(#[from] std::io::Error),
	/// No operation is registered under the requested name.
	#[error("No operation named `{name}` is registered.")]
	UnknownOperation {
		/// Requested operation name.
		name: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Convenience constructor for [`ConfigError::InvalidSetting`].
	pub fn invalid_setting(field: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidSetting { field: field.into(), reason: reason.into() }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint did not answer within the configured timeout.
	#[error("Token endpoint timed out.")]
	Timeout {
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint answered successfully with a response the crate cannot use.
	#[error("Token endpoint returned an unusable response: {0}")]
	InvalidTokenResponse(#[from] TokenResponseError),
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Defects in an otherwise successful token endpoint response.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenResponseError {
	/// Response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// `expires_in` cannot be represented as an expiry instant.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// `expires_in` was zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Granted scopes could not be normalized.
	#[error("Granted scopes are invalid: {0}")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Authorization-code response carried no id token.
	#[error("Token endpoint response is missing the id_token.")]
	MissingIdToken,
	/// Id token could not be decoded into claims.
	#[error("Id token is malformed: {reason}.")]
	InvalidIdToken {
		/// Decoding failure summary.
		reason: String,
	},
	/// Id token carries neither `oid`/`tid` nor `sub`.
	#[error("Id token does not identify an account.")]
	MissingAccountClaims,
}
impl From<TokenResponseError> for Error {
	fn from(e: TokenResponseError) -> Self {
		TransientError::from(e).into()
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
