//! Application settings: client registration, authority, permissions, role switch, and
//! backend selection.
//!
//! Settings are JSON. Parse failures carry the path of the offending field, and
//! [`AppConfig::validate`] rejects incomplete registrations before anything starts.

// std
use std::{path::Path, time::Duration as StdDuration};
// self
use crate::{
	_prelude::*,
	auth::{ApplicationId, ScopeSet},
	authority::AuthorityDescriptor,
	backend::{self, BackendInvoker, FunctionInvoker, SqlExecutor},
	error::ConfigError,
	flows::ReqwestAuthorityClient,
	gate::RoleGate,
	http::{DEFAULT_REQUEST_TIMEOUT, ReqwestHttpClient},
	router::TokenSource,
};

/// Which downstream backend protected operations call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSettings {
	/// HTTP function; the URL may carry a function key in its query.
	Function {
		/// Endpoint URL.
		url: Url,
	},
	/// SQL Server database reached with the caller's access token.
	Database {
		/// Server host name.
		sql_server: String,
		/// Database name.
		database: String,
	},
}

/// Application settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
	/// Authority URL such as `https://login.microsoftonline.com/<tenant>`.
	pub authority: Url,
	/// Registered application id.
	pub client_id: ApplicationId,
	/// Client secret.
	pub client_secret: String,
	/// Absolute sign-in callback URL.
	pub redirect_uri: Url,
	/// Where the authority returns the browser after sign-out; defaults to the redirect
	/// URI's origin.
	#[serde(default)]
	pub post_logout_redirect_uri: Option<Url>,
	/// Delegated permissions requested at sign-in and for silent acquisition.
	#[serde(default)]
	pub delegated_permissions: ScopeSet,
	/// App permissions requested through client credentials, typically `<resource>/.default`.
	pub application_permissions: ScopeSet,
	/// Enforces role claims when `true`.
	#[serde(default = "default_role_check")]
	pub role_check: bool,
	/// Token the data operations forward to the backend.
	#[serde(default)]
	pub backend_token_source: TokenSource,
	/// Backend the data operations call.
	pub backend: BackendSettings,
	/// Optional API called with the user's delegated token.
	#[serde(default)]
	pub graph_endpoint: Option<Url>,
	/// Upper bound for each token endpoint round trip, in seconds.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Seconds before expiry at which cached tokens stop being reused.
	#[serde(default = "default_preemptive_window_secs")]
	pub preemptive_window_secs: i64,
	/// Seconds a session survives without being saved.
	#[serde(default = "default_session_ttl_secs")]
	pub session_ttl_secs: i64,
}
impl AppConfig {
	/// Parses and validates settings from JSON text.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(json);
		let config: Self = serde_path_to_error::deserialize(&mut de)?;

		config.validate()?;

		Ok(config)
	}

	/// Reads, parses, and validates a settings file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		Self::from_json_str(&std::fs::read_to_string(path)?)
	}

	/// Rejects settings the application cannot start with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_secret.trim().is_empty() {
			return Err(ConfigError::invalid_setting("client_secret", "must not be empty"));
		}
		if self.application_permissions.is_empty() {
			return Err(ConfigError::invalid_setting(
				"application_permissions",
				"at least one scope is required",
			));
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::invalid_setting("request_timeout_secs", "must be positive"));
		}
		if self.preemptive_window_secs < 0 {
			return Err(ConfigError::invalid_setting(
				"preemptive_window_secs",
				"must not be negative",
			));
		}
		if self.session_ttl_secs <= 0 {
			return Err(ConfigError::invalid_setting("session_ttl_secs", "must be positive"));
		}

		ensure_web_url("redirect_uri", &self.redirect_uri)?;

		if let Some(url) = &self.post_logout_redirect_uri {
			ensure_web_url("post_logout_redirect_uri", url)?;
		}
		if let Some(url) = &self.graph_endpoint {
			ensure_web_url("graph_endpoint", url)?;
		}
		if let BackendSettings::Function { url } = &self.backend {
			ensure_web_url("backend.url", url)?;
		}

		self.descriptor()?;

		Ok(())
	}

	/// Authority descriptor derived from [`authority`](Self::authority).
	pub fn descriptor(&self) -> Result<AuthorityDescriptor, ConfigError> {
		Ok(AuthorityDescriptor::from_authority_url(&self.authority)?)
	}

	/// Token endpoint timeout.
	pub fn request_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.request_timeout_secs)
	}

	/// Post-logout landing page.
	pub fn post_logout_redirect(&self) -> Url {
		self.post_logout_redirect_uri.clone().unwrap_or_else(|| {
			let mut home = self.redirect_uri.clone();

			home.set_path("/");
			home.set_query(None);
			home.set_fragment(None);

			home
		})
	}

	/// Session lifetime for [`MemoryStore::with_ttl`](crate::session::MemoryStore::with_ttl)
	/// and [`FileStore::with_ttl`](crate::session::FileStore::with_ttl).
	pub fn session_ttl(&self) -> Duration {
		Duration::seconds(self.session_ttl_secs)
	}

	/// Role gate honoring [`role_check`](Self::role_check).
	pub fn role_gate(&self) -> RoleGate {
		RoleGate { enabled: self.role_check }
	}

	/// Authority client with a timeout-bounded reqwest transport.
	pub fn authority_client(&self) -> Result<ReqwestAuthorityClient, ConfigError> {
		Ok(ReqwestAuthorityClient::new(
			self.descriptor()?,
			self.client_id.clone(),
			self.redirect_uri.clone(),
			self.request_timeout(),
		)?
		.with_client_secret(self.client_secret.clone())
		.with_preemptive_window(Duration::seconds(self.preemptive_window_secs)))
	}

	/// Invoker that calls [`graph_endpoint`](Self::graph_endpoint) with whatever token the
	/// operation resolves, or `None` when no endpoint is configured.
	///
	/// Register it as a backend override on a delegated operation to call the API with the
	/// signed-in user's token.
	pub fn graph_invoker(&self) -> Result<Option<Arc<dyn BackendInvoker>>, ConfigError> {
		if self.graph_endpoint.is_none() {
			return Ok(None);
		}

		let http = ReqwestHttpClient::with_timeout(self.request_timeout())?;

		Ok(self.graph_invoker_with(http.0))
	}

	/// Same as [`graph_invoker`](Self::graph_invoker) over a caller-supplied client.
	pub fn graph_invoker_with(&self, client: ReqwestClient) -> Option<Arc<dyn BackendInvoker>> {
		self.graph_endpoint
			.as_ref()
			.map(|url| Arc::new(FunctionInvoker::new(client, url.clone())) as Arc<dyn BackendInvoker>)
	}

	/// Backend invoker selected by [`backend`](Self::backend).
	pub fn backend_invoker(
		&self,
		executor: Option<Arc<dyn SqlExecutor>>,
	) -> Result<Arc<dyn BackendInvoker>, ConfigError> {
		let http = ReqwestHttpClient::with_timeout(self.request_timeout())?;

		backend::from_settings(&self.backend, http.0, executor)
	}
}

fn default_role_check() -> bool {
	true
}

fn default_request_timeout_secs() -> u64 {
	DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_preemptive_window_secs() -> i64 {
	crate::flows::RefreshPolicy::DEFAULT_PREEMPTIVE_WINDOW.whole_seconds()
}

fn default_session_ttl_secs() -> i64 {
	crate::session::DEFAULT_SESSION_TTL.whole_seconds()
}

fn ensure_web_url(field: &str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if matches!(url.host_str(), Some("localhost" | "127.0.0.1")) => Ok(()),
		_ => Err(ConfigError::invalid_setting(field, "must use https outside localhost")),
	}
}
