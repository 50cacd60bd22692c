//! Walks one browser session through sign-in, a protected data call, and sign-out against a
//! mocked authority and HTTP function backend.

// std
use std::sync::Arc;
// crates.io
use color_eyre::{Result, eyre::eyre};
use httpmock::prelude::*;
// self
use oauth2_session_gate::{
	auth::SessionId,
	backend,
	config::AppConfig,
	flows::ReqwestAuthorityClient,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	portal::{CallbackParams, Portal, View},
	reqwest::Client,
	router::{Operation, TokenRouter},
	session::{MemoryStore, SessionStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/contoso/oauth2/v2.0/token")
				.body_includes("grant_type=authorization_code");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"access_token\":\"demo-user-token\",\"refresh_token\":\"demo-refresh\",\"id_token\":\"{}\",\"token_type\":\"bearer\",\"expires_in\":3600}}",
				demo_id_token(),
			));
		})
		.await;
	let _function_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/data").header("authorization", "Bearer demo-user-token");
			then.status(200).body("[[680, \"HL Road Frame - Black, 58\"]]");
		})
		.await;
	let _graph_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/me").header("authorization", "Bearer demo-user-token");
			then.status(200).body(r#"{"displayName":"Demo User"}"#);
		})
		.await;
	let config = AppConfig::from_json_str(&format!(
		r#"{{
			"authority": "{authority}",
			"client_id": "demo-client",
			"client_secret": "demo-secret",
			"redirect_uri": "http://localhost:5000/getAToken",
			"delegated_permissions": ["User.ReadBasic.All"],
			"application_permissions": ["https://database.windows.net/.default"],
			"backend": {{"type": "function", "url": "{function}"}},
			"graph_endpoint": "{graph}"
		}}"#,
		authority = server.url("/contoso"),
		function = server.url("/api/data?code=demo-key"),
		graph = server.url("/v1.0/me"),
	))?;
	// httpmock serves a self-signed certificate.
	let http = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let client = ReqwestAuthorityClient::with_http_client(
		config.descriptor()?,
		config.client_id.clone(),
		config.redirect_uri.clone(),
		http.clone(),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.with_client_secret(config.client_secret.clone());
	let graph = config
		.graph_invoker_with(http.0.clone())
		.ok_or_else(|| eyre!("Graph endpoint expected."))?;
	let router = TokenRouter::new(
		Arc::new(client),
		config.role_gate(),
		config.delegated_permissions.clone(),
		config.application_permissions.clone(),
		backend::from_settings(&config.backend, http.0.clone(), None)?,
	)
	.register(
		Operation::with_source("get_product_data", config.backend_token_source)
			.resource("SalesLT.Product"),
	)
	.register(
		Operation::with_source("get_customer_data", config.backend_token_source)
			.role("premium_user_access")
			.resource("SalesLT.Customer"),
	)
	.register(Operation::delegated("graphcall").backend(graph));
	let portal = Portal::new(router, config.post_logout_redirect());
	let sessions = MemoryStore::with_ttl(config.session_ttl());
	let sid = SessionId::generate();
	// Request 1: the browser opens the sign-in page.
	let mut session = sessions.load(&sid).await?.unwrap_or_default();
	let View::Login { auth_url } = portal.login(&mut session) else {
		return Err(eyre!("Sign-in page expected."));
	};

	println!("Send the browser to {auth_url}.");

	sessions.save(&sid, session).await?;

	// Request 2: the authority redirects back with the code and the issued state.
	let mut session = sessions.load(&sid).await?.unwrap_or_default();
	let params = CallbackParams {
		state: session.state.clone(),
		code: Some("demo-code".into()),
		..Default::default()
	};
	let view = portal.callback(&mut session, &params).await?;

	println!("Callback rendered {view:?}.");
	println!("Signed in as {:?}.", session.user.as_ref().and_then(|user| user.name.as_deref()));

	sessions.save(&sid, session).await?;

	// Request 3: protected operations reuse the cached token.
	let mut session = sessions.load(&sid).await?.unwrap_or_default();

	for operation in ["get_product_data", "get_customer_data", "graphcall"] {
		match portal.operation(&mut session, operation).await? {
			View::Display { message } => println!("{operation}: {message}"),
			other => println!("{operation}: {other:?}"),
		}
	}

	sessions.save(&sid, session).await?;

	// Request 4: sign-out clears the session and bounces through the authority.
	let mut session = sessions.load(&sid).await?.unwrap_or_default();

	println!("Sign-out renders {:?}.", portal.logout(&mut session));

	sessions.destroy(&sid).await?;

	Ok(())
}

fn demo_id_token() -> String {
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

	let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(
		r#"{"oid":"oid-demo","tid":"tid-contoso","name":"Demo User","preferred_username":"demo@contoso.example","roles":["basic_user_access"]}"#,
	);

	format!("{header}.{payload}.")
}
