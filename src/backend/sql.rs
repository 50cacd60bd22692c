//! SQL Server backend authenticated with an access token.
//!
//! Connecting is delegated to a [`SqlExecutor`]; this module prepares everything the driver
//! needs: the connection string, the pre-login access-token attribute, and the query.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	backend::{BackendError, BackendFuture, BackendInvoker, RawResult, SqlRow},
	error::ConfigError,
};

/// Pre-connection attribute id under which the driver expects the access token.
pub const SQL_COPT_SS_ACCESS_TOKEN: i32 = 1256;

const ODBC_DRIVER: &str = "ODBC Driver 17 for SQL Server";
const ROW_LIMIT: u32 = 10;

/// Everything needed to open a token-authenticated connection.
#[derive(Clone)]
pub struct SqlConnectRequest {
	/// ODBC connection string without credentials.
	pub connection_string: String,
	/// Attributes applied before connecting, keyed by attribute id.
	pub attrs_before: BTreeMap<i32, Vec<u8>>,
}
impl Debug for SqlConnectRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SqlConnectRequest")
			.field("connection_string", &self.connection_string)
			.field("attrs_before", &self.attrs_before.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Runs a query over a token-authenticated SQL Server connection.
pub trait SqlExecutor
where
	Self: Send + Sync,
{
	/// Connects with `connect` and returns every row of `query`.
	fn query<'a>(
		&'a self,
		connect: &'a SqlConnectRequest,
		query: &'a str,
	) -> BackendFuture<'a, Vec<SqlRow>>;
}

/// Reads the first rows of a table.
#[derive(Clone)]
pub struct SqlInvoker {
	connection_string: String,
	executor: Arc<dyn SqlExecutor>,
}
impl SqlInvoker {
	/// Creates an invoker for `database` on `server`.
	pub fn new(
		server: &str,
		database: &str,
		executor: Arc<dyn SqlExecutor>,
	) -> Result<Self, ConfigError> {
		Ok(Self { connection_string: connection_string(server, database)?, executor })
	}

	/// Connection string passed to the driver.
	pub fn connection_string(&self) -> &str {
		&self.connection_string
	}
}
impl Debug for SqlInvoker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SqlInvoker").field("connection_string", &self.connection_string).finish()
	}
}
impl BackendInvoker for SqlInvoker {
	fn invoke<'a>(
		&'a self,
		bearer: &'a TokenSecret,
		resource: Option<&'a str>,
	) -> BackendFuture<'a, RawResult> {
		Box::pin(async move {
			let table = resource.ok_or(BackendError::InvalidResource {
				resource: String::new(),
				reason: "a table name is required",
			})?;
			let query = select_query(table)?;
			let connect = SqlConnectRequest {
				connection_string: self.connection_string.clone(),
				attrs_before: BTreeMap::from([(
					SQL_COPT_SS_ACCESS_TOKEN,
					encode_access_token(bearer.expose()),
				)]),
			};
			let rows = self.executor.query(&connect, &query).await?;

			Ok(RawResult::Rows { rows })
		})
	}
}

/// Encodes a token the way the driver expects it in [`SQL_COPT_SS_ACCESS_TOKEN`]: each
/// byte followed by a zero byte, prefixed by the little-endian 32-bit length of that
/// expansion.
pub fn encode_access_token(token: &str) -> Vec<u8> {
	let expanded = token.bytes().flat_map(|byte| [byte, 0]).collect::<Vec<_>>();
	let len = i32::try_from(expanded.len()).unwrap_or(i32::MAX);
	let mut encoded = Vec::with_capacity(expanded.len() + 4);

	encoded.extend_from_slice(&len.to_le_bytes());
	encoded.extend_from_slice(&expanded);

	encoded
}

/// Builds `SELECT top 10 * FROM <table>` after validating `table`.
pub fn select_query(table: &str) -> Result<String, BackendError> {
	validate_table_name(table)?;

	Ok(format!("SELECT top {ROW_LIMIT} * FROM {table}"))
}

fn connection_string(server: &str, database: &str) -> Result<String, ConfigError> {
	for (field, value) in [("backend.sql_server", server), ("backend.database", database)] {
		if value.trim().is_empty() {
			return Err(ConfigError::invalid_setting(field, "must not be empty"));
		}
		if value.contains([';', '{', '}']) {
			return Err(ConfigError::invalid_setting(field, "must not contain `;`, `{`, or `}`"));
		}
	}

	Ok(format!("DRIVER={{{ODBC_DRIVER}}};SERVER={server};DATABASE={database}"))
}

fn validate_table_name(table: &str) -> Result<(), BackendError> {
	let invalid = |reason| BackendError::InvalidResource {
		resource: table.to_owned(),
		reason,
	};
	let parts = table.split('.').collect::<Vec<_>>();

	if parts.len() > 3 {
		return Err(invalid("at most three dotted parts are allowed"));
	}

	for part in parts {
		let mut chars = part.chars();

		match chars.next() {
			Some(first) if first.is_ascii_alphabetic() || first == '_' => {},
			_ => return Err(invalid("each part must start with a letter or underscore")),
		}

		if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
			return Err(invalid("only letters, digits, and underscores are allowed"));
		}
	}

	Ok(())
}
