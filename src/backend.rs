//! Downstream calls that consume a bearer token: an HTTP function and a SQL database.
//!
//! Both implement [`BackendInvoker`] and are chosen once at startup from
//! [`BackendSettings`]; request handling never branches on the backend kind.

pub mod http;
pub mod sql;

pub use http::FunctionInvoker;
pub use sql::*;

// self
use crate::{_prelude::*, auth::TokenSecret, config::BackendSettings, error::ConfigError};

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, BackendError>> + 'a + Send>>;

/// One result row, cells in column order.
pub type SqlRow = Vec<serde_json::Value>;

/// Performs a downstream call authenticated with `bearer`.
pub trait BackendInvoker
where
	Self: Send + Sync,
{
	/// Calls the backend for `resource` (a table name, or nothing for whole-endpoint calls).
	fn invoke<'a>(
		&'a self,
		bearer: &'a TokenSecret,
		resource: Option<&'a str>,
	) -> BackendFuture<'a, RawResult>;
}

/// Uninterpreted backend output, rendered to the user as diagnostic text.
///
/// HTTP output renders as `<status> <body>` so failures stay visible next to their content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawResult {
	/// HTTP response, whatever its status.
	Http {
		/// Response status code.
		status: u16,
		/// Response body text.
		body: String,
	},
	/// Rows returned by a query.
	Rows {
		/// Result rows.
		rows: Vec<SqlRow>,
	},
}
impl Display for RawResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Http { status, body } => write!(f, "{status} {body}"),
			Self::Rows { rows } => {
				let rendered = serde_json::to_string(rows).map_err(|_| std::fmt::Error)?;

				f.write_str(&rendered)
			},
		}
	}
}

/// Downstream call failures.
#[derive(Debug, ThisError)]
pub enum BackendError {
	/// The HTTP request could not be completed.
	#[error("Backend request failed.")]
	Http {
		/// Underlying transport failure.
		#[source]
		source: ReqwestError,
	},
	/// The resource name is not acceptable for this backend.
	#[error("Resource `{resource}` is invalid: {reason}.")]
	InvalidResource {
		/// Offending resource name.
		resource: String,
		/// Why it was rejected.
		reason: &'static str,
	},
	/// The database reported an error.
	#[error("Database query failed: {message}.")]
	Sql {
		/// Driver-reported message.
		message: String,
	},
}
impl From<ReqwestError> for BackendError {
	fn from(source: ReqwestError) -> Self {
		Self::Http { source }
	}
}

/// Builds the invoker described by `settings`.
///
/// `Database` settings need an `executor`; its absence is a configuration error.
pub fn from_settings(
	settings: &BackendSettings,
	client: ReqwestClient,
	executor: Option<Arc<dyn SqlExecutor>>,
) -> Result<Arc<dyn BackendInvoker>, ConfigError> {
	match settings {
		BackendSettings::Function { url } => Ok(Arc::new(FunctionInvoker::new(client, url.clone()))),
		BackendSettings::Database { sql_server, database } => {
			let executor = executor.ok_or_else(|| {
				ConfigError::invalid_setting("backend", "database backend requires a SQL executor")
			})?;

			Ok(Arc::new(SqlInvoker::new(sql_server, database, executor)?))
		},
	}
}
