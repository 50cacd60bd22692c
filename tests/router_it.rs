#![cfg(feature = "test")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_session_gate::{
	_preludet::*,
	backend::{FunctionInvoker, RawResult},
	cache::{TokenCache, TokenCacheStore},
	config::AppConfig,
	gate::RoleGate,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	router::{BearerDecision, InvokeOutcome, Operation, TokenRouter},
	session::Session,
};

const APP_SCOPE: &str = "https://contoso-fn.azurewebsites.net/.default";

fn build_router(
	server: &MockServer,
	gate: RoleGate,
) -> TokenRouter<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	let client = build_reqwest_test_client(test_descriptor(&server.url("")));
	let backend = FunctionInvoker::new(
		test_reqwest_http_client().0,
		Url::parse(&server.url("/api/data")).expect("Function URL should parse successfully."),
	);

	TokenRouter::new(
		Arc::new(client),
		gate,
		scopes("User.ReadBasic.All"),
		scopes(APP_SCOPE),
		Arc::new(backend),
	)
	.register(Operation::daemon("nightly_export").resource("SalesLT.Product"))
	.register(Operation::app_only("get_premium_data").role("premium_user_access"))
	.register(Operation::delegated("get_product_data").resource("SalesLT.Product"))
}

async fn sign_in(
	server: &MockServer,
	router: &TokenRouter<ReqwestHttpClient, ReqwestTransportErrorMapper>,
	roles: &[&str],
) -> Session {
	let id_token = fake_id_token(
		&serde_json::json!({
			"oid": "oid-grace",
			"tid": "tid-contoso",
			"name": "Grace Hopper",
			"preferred_username": "grace@contoso.example",
			"roles": roles,
		})
		.to_string(),
	);
	let body = serde_json::json!({
		"access_token": "user-at",
		"refresh_token": "user-rt",
		"id_token": id_token,
		"token_type": "bearer",
		"expires_in": 3600,
		"scope": "User.ReadBasic.All openid profile offline_access",
	})
	.to_string();
	let mock = server
		.mock_async(move |when, then| {
			when.method(POST)
				.path("/oauth2/v2.0/token")
				.body_includes("grant_type=authorization_code");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await;
	let mut cache = TokenCache::default();
	let result = router
		.client()
		.exchange_code_for_token("auth-code", router.delegated_scopes(), &mut cache)
		.await
		.expect("Code exchange should succeed.");
	let mut session = Session { user: result.id_token_claims, ..Default::default() };

	TokenCacheStore.save(&mut session, &mut cache).expect("Save should succeed.");
	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	session
}

async fn mock_app_token(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/v2.0/token")
				.body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"app-at","token_type":"bearer","expires_in":3599}"#,
			);
		})
		.await
}

#[tokio::test]
async fn daemon_operations_run_without_a_signed_in_user() {
	let server = MockServer::start_async().await;
	let router = build_router(&server, RoleGate::enforcing());
	let token_mock = mock_app_token(&server).await;
	let backend_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/data")
				.query_param("name", "SalesLT.Product")
				.header("authorization", "Bearer app-at");
			then.status(200).body("[]");
		})
		.await;
	let mut session = Session::default();
	let outcome =
		router.invoke(&mut session, "nightly_export").await.expect("Daemon call should succeed.");

	assert!(matches!(
		outcome,
		InvokeOutcome::Completed(RawResult::Http { status: 200, ref body }) if body == "[]"
	));
	assert_eq!(session, Session::default(), "Daemon calls leave the session untouched.");

	token_mock.assert_calls_async(1).await;
	backend_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn anonymous_users_are_sent_to_sign_in() {
	let server = MockServer::start_async().await;
	let router = build_router(&server, RoleGate::enforcing());
	let mut session = Session::default();

	assert!(matches!(
		router.get_bearer_token_for(&mut session, "get_product_data").await,
		Ok(BearerDecision::RedirectToLogin)
	));
	assert!(matches!(
		router.invoke(&mut session, "get_premium_data").await,
		Ok(InvokeOutcome::RedirectToLogin)
	));
}

#[tokio::test]
async fn app_only_operations_require_the_role_then_forward_the_app_token() {
	let server = MockServer::start_async().await;
	let router = build_router(&server, RoleGate::enforcing());
	let mut premium = sign_in(&server, &router, &["basic_user_access", "premium_user_access"]).await;
	let token_mock = mock_app_token(&server).await;

	match router.get_bearer_token_for(&mut premium, "get_premium_data").await {
		Ok(BearerDecision::Token(token)) => assert_eq!(token.secret.expose(), "app-at"),
		other => panic!("Unexpected decision: {other:?}"),
	}
	match router.get_bearer_token_for(&mut premium, "get_product_data").await {
		Ok(BearerDecision::Token(token)) => assert_eq!(token.secret.expose(), "user-at"),
		other => panic!("Unexpected decision: {other:?}"),
	}

	let mut basic = sign_in(&server, &router, &["basic_user_access"]).await;

	match router.get_bearer_token_for(&mut basic, "get_premium_data").await {
		Ok(BearerDecision::Denied(denied)) => assert_eq!(denied.role, "premium_user_access"),
		other => panic!("Unexpected decision: {other:?}"),
	}

	token_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn disabled_gate_lets_every_signed_in_user_through() {
	let server = MockServer::start_async().await;
	let router = build_router(&server, RoleGate::disabled());
	let mut session = sign_in(&server, &router, &[]).await;
	let _token_mock = mock_app_token(&server).await;

	assert!(matches!(
		router.get_bearer_token_for(&mut session, "get_premium_data").await,
		Ok(BearerDecision::Token(_))
	));
}

#[tokio::test]
async fn unknown_operations_are_configuration_errors() {
	let server = MockServer::start_async().await;
	let router = build_router(&server, RoleGate::enforcing());
	let mut session = Session::default();

	assert!(matches!(router.invoke(&mut session, "drop_tables").await, Err(Error::Config(_))));
}

#[tokio::test]
async fn graph_operations_forward_the_delegated_token_to_the_graph_endpoint() {
	let server = MockServer::start_async().await;
	let config = AppConfig::from_json_str(&format!(
		r#"{{
			"authority": "{authority}",
			"client_id": "{TEST_CLIENT_ID}",
			"client_secret": "{TEST_CLIENT_SECRET}",
			"redirect_uri": "{TEST_REDIRECT_URI}",
			"application_permissions": ["{APP_SCOPE}"],
			"backend": {{"type": "function", "url": "{function}"}},
			"graph_endpoint": "{graph}"
		}}"#,
		authority = server.url("/contoso"),
		function = server.url("/api/data"),
		graph = server.url("/v1.0/me"),
	))
	.expect("Settings should parse.");
	let graph = config
		.graph_invoker_with(test_reqwest_http_client().0)
		.expect("Graph endpoint is configured.");
	let router = build_router(&server, RoleGate::enforcing())
		.register(Operation::delegated("graphcall").backend(graph));
	let mut session = sign_in(&server, &router, &["basic_user_access"]).await;
	let graph_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/me").header("authorization", "Bearer user-at");
			then.status(200).body(r#"{"displayName":"Grace Hopper"}"#);
		})
		.await;
	let outcome =
		router.invoke(&mut session, "graphcall").await.expect("Graph call should succeed.");

	assert!(matches!(
		outcome,
		InvokeOutcome::Completed(RawResult::Http { status: 200, ref body })
			if body.contains("Grace Hopper")
	));

	graph_mock.assert_calls_async(1).await;
}
