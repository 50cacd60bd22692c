//! Per-operation choice of bearer token and the downstream call that uses it.
//!
//! Each protected operation is registered once with the token it forwards, the role it
//! requires, and the resource it reads. Resolving a request walks a fixed sequence: the
//! session must hold a signed-in user with a silently obtainable token, the role gate must
//! pass, and only then is the delegated or app-only token handed out.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
	backend::{BackendInvoker, RawResult},
	cache::TokenCacheStore,
	error::ConfigError,
	flows::AuthorityClient,
	gate::{AuthorizationError, RequiredRole, RoleGate},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	session::Session,
};

/// Which identity a token represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
	/// The signed-in user's delegated token.
	#[default]
	DelegatedUser,
	/// The application's own client-credentials token.
	AppOnly,
}

/// A protected operation.
#[derive(Clone)]
pub struct Operation {
	/// Registration key.
	pub name: String,
	/// Token forwarded to the backend.
	pub token_source: TokenSource,
	/// Role the signed-in user must hold.
	pub required_role: RequiredRole,
	/// Resource passed to the backend.
	pub resource: Option<String>,
	/// When `false` the operation runs without a signed-in user, always with an app-only
	/// token.
	pub requires_sign_in: bool,
	/// Backend used instead of the router default.
	pub backend: Option<Arc<dyn BackendInvoker>>,
}
impl Operation {
	/// Operation forwarding the signed-in user's token.
	pub fn delegated(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			token_source: TokenSource::DelegatedUser,
			required_role: RequiredRole::Basic,
			resource: None,
			requires_sign_in: true,
			backend: None,
		}
	}

	/// Operation forwarding the application's token on behalf of a signed-in user.
	pub fn app_only(name: impl Into<String>) -> Self {
		Self { token_source: TokenSource::AppOnly, ..Self::delegated(name) }
	}

	/// Operation with an explicit token source.
	pub fn with_source(name: impl Into<String>, token_source: TokenSource) -> Self {
		Self { token_source, ..Self::delegated(name) }
	}

	/// Daemon operation: no sign-in, app-only token.
	pub fn daemon(name: impl Into<String>) -> Self {
		Self { requires_sign_in: false, ..Self::app_only(name) }
	}

	/// Requires `role`.
	pub fn role(mut self, role: impl Into<RequiredRole>) -> Self {
		self.required_role = role.into();

		self
	}

	/// Sets the backend resource.
	pub fn resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = Some(resource.into());

		self
	}

	/// Sends this operation to `backend` instead of the router default.
	pub fn backend(mut self, backend: Arc<dyn BackendInvoker>) -> Self {
		self.backend = Some(backend);

		self
	}
}
impl Debug for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Operation")
			.field("name", &self.name)
			.field("token_source", &self.token_source)
			.field("required_role", &self.required_role)
			.field("resource", &self.resource)
			.field("requires_sign_in", &self.requires_sign_in)
			.field("backend_override", &self.backend.is_some())
			.finish()
	}
}

/// Result of resolving the bearer token for an operation.
#[derive(Clone, Debug)]
pub enum BearerDecision {
	/// Token to forward.
	Token(AccessToken),
	/// The user must sign in interactively first.
	RedirectToLogin,
	/// The user lacks the operation's role.
	Denied(AuthorizationError),
}

/// Result of running an operation end to end.
#[derive(Clone, Debug)]
pub enum InvokeOutcome {
	/// Backend output.
	Completed(RawResult),
	/// The user must sign in interactively first.
	RedirectToLogin,
	/// The user lacks the operation's role.
	Denied(AuthorizationError),
}

/// Registry of operations plus everything needed to resolve their tokens.
pub struct TokenRouter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: Arc<AuthorityClient<C, M>>,
	gate: RoleGate,
	cache_store: TokenCacheStore,
	delegated_scopes: ScopeSet,
	application_scopes: ScopeSet,
	default_backend: Arc<dyn BackendInvoker>,
	operations: HashMap<String, Operation>,
}
impl<C, M> TokenRouter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a router with no operations registered.
	pub fn new(
		client: Arc<AuthorityClient<C, M>>,
		gate: RoleGate,
		delegated_scopes: ScopeSet,
		application_scopes: ScopeSet,
		default_backend: Arc<dyn BackendInvoker>,
	) -> Self {
		Self {
			client,
			gate,
			cache_store: TokenCacheStore,
			delegated_scopes,
			application_scopes,
			default_backend,
			operations: HashMap::new(),
		}
	}

	/// Registers `operation`, replacing any operation with the same name.
	pub fn register(mut self, operation: Operation) -> Self {
		self.operations.insert(operation.name.clone(), operation);

		self
	}

	/// Authority client shared by every operation.
	pub fn client(&self) -> &Arc<AuthorityClient<C, M>> {
		&self.client
	}

	/// Delegated scopes requested for signed-in users.
	pub fn delegated_scopes(&self) -> &ScopeSet {
		&self.delegated_scopes
	}

	/// Registered operation named `name`.
	pub fn operation(&self, name: &str) -> Result<&Operation, ConfigError> {
		self.operations
			.get(name)
			.ok_or_else(|| ConfigError::UnknownOperation { name: name.to_owned() })
	}

	/// Resolves the bearer token `operation` should forward.
	///
	/// The session's token cache is written back whenever silent acquisition changed it,
	/// including when acquisition then fails.
	pub async fn get_bearer_token_for(
		&self,
		session: &mut Session,
		operation: &str,
	) -> Result<BearerDecision> {
		let operation = self.operation(operation)?;

		if !operation.requires_sign_in {
			let app = self.client.acquire_token_for_client(&self.application_scopes).await?;

			return Ok(BearerDecision::Token(app.access_token));
		}

		let Some(claims) = session.user.clone() else {
			return Ok(BearerDecision::RedirectToLogin);
		};
		let mut cache = self.cache_store.load(session);
		let silent = self.client.acquire_token_silent(&self.delegated_scopes, &mut cache).await;

		self.cache_store.save(session, &mut cache)?;

		let Some(user_token) = silent? else {
			return Ok(BearerDecision::RedirectToLogin);
		};

		if let Err(denied) = self.gate.check(&claims, &operation.required_role) {
			return Ok(BearerDecision::Denied(denied));
		}

		match operation.token_source {
			TokenSource::DelegatedUser => Ok(BearerDecision::Token(user_token.access_token)),
			TokenSource::AppOnly => {
				let app = self.client.acquire_token_for_client(&self.application_scopes).await?;

				Ok(BearerDecision::Token(app.access_token))
			},
		}
	}

	/// Resolves the token for `operation` and, when one is granted, calls its backend.
	pub async fn invoke(&self, session: &mut Session, operation: &str) -> Result<InvokeOutcome> {
		let token = match self.get_bearer_token_for(session, operation).await? {
			BearerDecision::Token(token) => token,
			BearerDecision::RedirectToLogin => return Ok(InvokeOutcome::RedirectToLogin),
			BearerDecision::Denied(denied) => return Ok(InvokeOutcome::Denied(denied)),
		};
		let operation = self.operation(operation)?;
		let backend = operation.backend.as_ref().unwrap_or(&self.default_backend);
		let raw = backend.invoke(&token.secret, operation.resource.as_deref()).await?;

		Ok(InvokeOutcome::Completed(raw))
	}
}
impl<C, M> Debug for TokenRouter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRouter")
			.field("gate", &self.gate)
			.field("delegated_scopes", &self.delegated_scopes)
			.field("application_scopes", &self.application_scopes)
			.field("operations", &self.operations.keys().collect::<Vec<_>>())
			.finish()
	}
}
