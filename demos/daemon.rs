//! Runs an operation that needs no signed-in user: the router acquires an app-only token via
//! client credentials and forwards it to an HTTP function.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth2_session_gate::{
	auth::{ApplicationId, ScopeSet},
	authority::AuthorityDescriptor,
	backend::FunctionInvoker,
	flows::ReqwestAuthorityClient,
	gate::RoleGate,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	reqwest::Client,
	router::{InvokeOutcome, Operation, TokenRouter},
	session::Session,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/contoso/oauth2/v2.0/token")
				.body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-app-token\",\"token_type\":\"bearer\",\"expires_in\":3599}",
			);
		})
		.await;
	let function_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/data")
				.query_param("name", "SalesLT.Product")
				.header("authorization", "Bearer demo-app-token");
			then.status(200).body("[[680, \"HL Road Frame - Black, 58\"]]");
		})
		.await;
	let http = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let descriptor = AuthorityDescriptor::from_authority_url(&Url::parse(&server.url("/contoso"))?)?;
	let client = ReqwestAuthorityClient::with_http_client(
		descriptor,
		ApplicationId::new("demo-daemon")?,
		Url::parse("http://localhost:5000/getAToken")?,
		http.clone(),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.with_client_secret("demo-secret");
	let router = TokenRouter::new(
		Arc::new(client),
		RoleGate::enforcing(),
		ScopeSet::default(),
		ScopeSet::new(["https://contoso-fn.azurewebsites.net/.default"])?,
		Arc::new(FunctionInvoker::new(http.0.clone(), Url::parse(&server.url("/api/data"))?)),
	)
	.register(Operation::daemon("nightly_export").resource("SalesLT.Product"));
	// Daemon runs have no browser; an empty session stands in.
	let mut session = Session::default();

	for run in 1..=2 {
		match router.invoke(&mut session, "nightly_export").await? {
			InvokeOutcome::Completed(raw) => println!("Run {run}: {raw}"),
			other => println!("Run {run}: {other:?}"),
		}
	}

	token_mock.assert_calls_async(1).await;
	function_mock.assert_calls_async(2).await;

	Ok(())
}
