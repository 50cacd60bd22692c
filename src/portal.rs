//! Request-boundary handlers that turn sign-in, sign-out, and protected operations into
//! [`View`]s for a web layer to render.
//!
//! Every expected failure (state mismatch, provider errors, missing accounts, denied roles,
//! backend failures) becomes a view here. Only configuration and storage errors escape.

// self
use crate::{
	_prelude::*,
	auth::IdentityClaims,
	cache::TokenCacheStore,
	error::{ProviderError, TransientError},
	flows,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	router::{InvokeOutcome, TokenRouter},
	session::Session,
};

const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
const INVALID_TOKEN_RESPONSE: &str = "invalid_token_response";

/// Query parameters the authority sends to the sign-in callback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
	/// Echoed anti-forgery value.
	#[serde(default)]
	pub state: Option<String>,
	/// Authorization code on success.
	#[serde(default)]
	pub code: Option<String>,
	/// OAuth error code on failure.
	#[serde(default)]
	pub error: Option<String>,
	/// Human-readable error detail.
	#[serde(default)]
	pub error_description: Option<String>,
}

/// Error details shown on the sign-in error page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorPayload {
	/// OAuth error code.
	pub error: String,
	/// Human-readable error detail.
	pub error_description: Option<String>,
}
impl From<ProviderError> for AuthErrorPayload {
	fn from(err: ProviderError) -> Self {
		Self { error: err.error, error_description: err.error_description }
	}
}

/// What the web layer should render or where it should redirect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
	/// Home page for a signed-in user.
	Index {
		/// The user's claims.
		user: IdentityClaims,
	},
	/// Sign-in page linking to the authority.
	Login {
		/// Authorize URL.
		auth_url: Url,
	},
	/// Redirect to the home page.
	RedirectHome,
	/// Redirect to the sign-in page.
	RedirectToLogin,
	/// Redirect to an external URL.
	Redirect {
		/// Target.
		url: Url,
	},
	/// Sign-in failure page.
	AuthError(AuthErrorPayload),
	/// Result or diagnostic text.
	Display {
		/// Text to show.
		message: String,
	},
}

/// Handlers for the application's routes.
pub struct Portal<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	router: TokenRouter<C, M>,
	cache_store: TokenCacheStore,
	post_logout_redirect_uri: Url,
}
impl<C, M> Portal<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates the handlers around `router`.
	pub fn new(router: TokenRouter<C, M>, post_logout_redirect_uri: Url) -> Self {
		Self { router, cache_store: TokenCacheStore, post_logout_redirect_uri }
	}

	/// Router the portal delegates protected operations to.
	pub fn router(&self) -> &TokenRouter<C, M> {
		&self.router
	}

	/// Home page, or a redirect to sign-in for anonymous sessions.
	pub fn index(&self, session: &Session) -> View {
		match &session.user {
			Some(user) => View::Index { user: user.clone() },
			None => View::RedirectToLogin,
		}
	}

	/// Issues a fresh state into the session and returns the sign-in page.
	pub fn login(&self, session: &mut Session) -> View {
		let state = flows::generate_state();
		let auth_url =
			self.router.client().build_authorization_url(self.router.delegated_scopes(), &state);

		session.issue_state(state);

		View::Login { auth_url }
	}

	/// Handles the authority's redirect back to the application.
	pub async fn callback(&self, session: &mut Session, params: &CallbackParams) -> Result<View> {
		if !session.consume_state(params.state.as_deref()) {
			return Ok(View::RedirectHome);
		}
		if let Some(error) = &params.error {
			return Ok(View::AuthError(AuthErrorPayload {
				error: error.clone(),
				error_description: params.error_description.clone(),
			}));
		}

		let Some(code) = params.code.as_deref() else {
			return Ok(View::RedirectHome);
		};
		let mut cache = self.cache_store.load(session);
		let exchanged = self
			.router
			.client()
			.exchange_code_for_token(code, self.router.delegated_scopes(), &mut cache)
			.await;
		let result = match exchanged {
			Ok(result) => result,
			Err(err) => return boundary_view(err),
		};

		session.user = result.id_token_claims;
		self.cache_store.save(session, &mut cache)?;

		Ok(View::RedirectHome)
	}

	/// Clears the session and signs out of the authority when it has a logout endpoint.
	pub fn logout(&self, session: &mut Session) -> View {
		session.clear();

		match self.router.client().logout_url(&self.post_logout_redirect_uri) {
			Some(url) => View::Redirect { url },
			None => View::RedirectHome,
		}
	}

	/// Runs the protected operation `name`.
	pub async fn operation(&self, session: &mut Session, name: &str) -> Result<View> {
		match self.router.invoke(session, name).await {
			Ok(InvokeOutcome::Completed(raw)) => Ok(View::Display { message: raw.to_string() }),
			Ok(InvokeOutcome::RedirectToLogin) => Ok(View::RedirectToLogin),
			Ok(InvokeOutcome::Denied(denied)) => Ok(View::Display { message: denied.to_string() }),
			Err(Error::Backend(err)) => Ok(View::Display { message: err.to_string() }),
			Err(err) => boundary_view(err),
		}
	}
}
impl<C, M> Debug for Portal<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Portal")
			.field("router", &self.router)
			.field("post_logout_redirect_uri", &self.post_logout_redirect_uri)
			.finish()
	}
}

fn boundary_view(err: Error) -> Result<View> {
	match err {
		Error::Provider(err) => Ok(View::AuthError(err.into())),
		Error::Transient(TransientError::InvalidTokenResponse(defect)) => {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %defect, "authority returned an unusable token response");

			Ok(View::AuthError(AuthErrorPayload {
				error: INVALID_TOKEN_RESPONSE.into(),
				error_description: Some(defect.to_string()),
			}))
		},
		Error::Transport(_) | Error::Transient(_) => {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %err, "authority unavailable");

			Ok(View::AuthError(AuthErrorPayload {
				error: TEMPORARILY_UNAVAILABLE.into(),
				error_description: Some(err.to_string()),
			}))
		},
		err => Err(err),
	}
}
