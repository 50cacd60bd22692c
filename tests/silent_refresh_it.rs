#![cfg(feature = "test")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_session_gate::{
	_preludet::*,
	cache::{TokenCache, TokenCacheStore},
	session::Session,
};

fn id_token() -> String {
	fake_id_token(
		&serde_json::json!({
			"oid": "oid-ada",
			"tid": "tid-contoso",
			"name": "Ada Lovelace",
			"preferred_username": "ada@contoso.example",
			"roles": ["basic_user_access"],
		})
		.to_string(),
	)
}

async fn signed_in_cache(server: &MockServer, client: &ReqwestTestClient) -> TokenCache {
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/v2.0/token")
				.body_includes("grant_type=authorization_code");
			then.status(200).header("content-type", "application/json").body(
				serde_json::json!({
					"access_token": "at-1",
					"refresh_token": "rt-1",
					"id_token": id_token(),
					"token_type": "bearer",
					"expires_in": 3600,
					"scope": "User.ReadBasic.All openid profile offline_access",
				})
				.to_string(),
			);
		})
		.await;
	let mut cache = TokenCache::default();

	client
		.exchange_code_for_token("auth-code", &scopes("User.ReadBasic.All"), &mut cache)
		.await
		.expect("Code exchange should succeed.");
	mock.assert_calls_async(1).await;

	cache
}

#[tokio::test]
async fn uncovered_scopes_redeem_and_rotate_the_refresh_token() {
	let server = MockServer::start_async().await;
	let client = build_reqwest_test_client(test_descriptor(&server.url("")));
	let mut cache = signed_in_cache(&server, &client).await;
	let store = TokenCacheStore;
	let mut session = Session::default();

	assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));
	assert!(!cache.has_state_changed());

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/v2.0/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=rt-1");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"at-2","refresh_token":"rt-2","token_type":"bearer","expires_in":3600,"scope":"Mail.Read openid profile offline_access"}"#,
			);
		})
		.await;
	let mut cache = store.load(&session);
	let refreshed = client
		.acquire_token_silent(&scopes("Mail.Read"), &mut cache)
		.await
		.expect("Silent acquisition should succeed.")
		.expect("A refresh token is cached.");

	assert_eq!(refreshed.access_token.secret.expose(), "at-2");
	assert!(cache.has_state_changed());

	let account = refreshed.account.expect("Silent results carry the account.");

	assert_eq!(
		cache.refresh_token(&client.partition(), &account).map(|secret| secret.expose()),
		Some("rt-2")
	);
	assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));

	// The new token now covers the request and comes straight from the cache.
	let mut cache = store.load(&session);
	let cached = client
		.acquire_token_silent(&scopes("Mail.Read"), &mut cache)
		.await
		.expect("Silent acquisition should succeed.")
		.expect("The cached token is reusable.");

	assert_eq!(cached.access_token.secret.expose(), "at-2");
	assert!(!cache.has_state_changed());
	assert!(!store.save(&mut session, &mut cache).expect("Save should succeed."));

	// The delegated token from sign-in is still cached for its own scopes.
	let original = client
		.acquire_token_silent(&scopes("User.ReadBasic.All"), &mut cache)
		.await
		.expect("Silent acquisition should succeed.")
		.expect("The sign-in token is reusable.");

	assert_eq!(original.access_token.secret.expose(), "at-1");

	refresh_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_refresh_token_requires_interactive_sign_in() {
	let server = MockServer::start_async().await;
	let client = build_reqwest_test_client(test_descriptor(&server.url("")));
	let store = TokenCacheStore;
	let mut session = Session::default();
	let mut cache = signed_in_cache(&server, &client).await;

	store.save(&mut session, &mut cache).expect("Save should succeed.");

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/v2.0/token").body_includes("grant_type=refresh_token");
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":"invalid_grant","error_description":"AADSTS700082: The refresh token has expired."}"#,
			);
		})
		.await;
	let mut cache = store.load(&session);
	let outcome = client
		.acquire_token_silent(&scopes("Mail.Read"), &mut cache)
		.await
		.expect("A rejected refresh token is not an error.");

	assert!(outcome.is_none());
	assert!(cache.has_state_changed(), "The dead account must be dropped from the cache.");
	assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));

	let mut cache = store.load(&session);

	assert!(cache.accounts().is_empty());
	assert!(
		client
			.acquire_token_silent(&scopes("Mail.Read"), &mut cache)
			.await
			.expect("An empty cache is not an error.")
			.is_none()
	);

	refresh_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_server_errors_propagate() {
	let server = MockServer::start_async().await;
	let client = build_reqwest_test_client(test_descriptor(&server.url("")));
	let mut cache = signed_in_cache(&server, &client).await;
	let _refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/v2.0/token").body_includes("grant_type=refresh_token");
			then.status(503)
				.header("content-type", "application/json")
				.header("retry-after", "5")
				.body(r#"{"error":"temporarily_unavailable"}"#);
		})
		.await;
	let err = client
		.acquire_token_silent(&scopes("Mail.Read"), &mut cache)
		.await
		.expect_err("Authority outages must surface.");

	assert!(matches!(err, Error::Provider(_) | Error::Transient(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn corrupt_session_cache_behaves_like_an_empty_one() {
	let server = MockServer::start_async().await;
	let client = build_reqwest_test_client(test_descriptor(&server.url("")));
	let store = TokenCacheStore;
	let mut session = Session { token_cache: Some("{not json".into()), ..Default::default() };
	let mut cache = store.load(&session);

	assert!(cache.accounts().is_empty());
	assert!(
		client
			.acquire_token_silent(&scopes("User.ReadBasic.All"), &mut cache)
			.await
			.expect("An empty cache is not an error.")
			.is_none()
	);
	assert!(store.save(&mut session, &mut cache).expect("Save should succeed."));
	assert_ne!(session.token_cache.as_deref(), Some("{not json"));
}
