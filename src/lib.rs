//! Session-scoped OAuth 2.0/OIDC sign-in, token caching, role gating, and bearer routing for
//! web apps that forward user or app-only tokens to downstream APIs and databases.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod flows;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod portal;
pub mod router;
pub mod session;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ApplicationId, AuthorityId, ScopeSet},
		authority::{AuthorityDescriptor, ClientAuthMethod, GrantType},
		flows::AuthorityClient,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
	};

	/// Authority client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = AuthorityClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Client identifier shared by integration tests.
	pub const TEST_CLIENT_ID: &str = "client-it";
	/// Client secret shared by integration tests.
	pub const TEST_CLIENT_SECRET: &str = "secret-it";
	/// Redirect URI shared by integration tests.
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/getAToken";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.timeout(std::time::Duration::from_secs(5))
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a descriptor whose endpoints live on the provided mock base URL.
	pub fn test_descriptor(base: &str) -> AuthorityDescriptor {
		let url = |path: &str| {
			Url::parse(&format!("{}{path}", base.trim_end_matches('/')))
				.expect("Mock endpoint URL should parse successfully.")
		};

		AuthorityDescriptor::builder(
			AuthorityId::new("mock-tenant").expect("Authority fixture should be valid."),
		)
		.authorization_endpoint(url("/oauth2/v2.0/authorize"))
		.token_endpoint(url("/oauth2/v2.0/token"))
		.logout_endpoint(url("/oauth2/v2.0/logout"))
		.support_grants([
			GrantType::AuthorizationCode,
			GrantType::RefreshToken,
			GrantType::ClientCredentials,
		])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Mock descriptor should build successfully.")
	}

	/// Constructs an [`AuthorityClient`] backed by the reqwest transport used across
	/// integration tests.
	pub fn build_reqwest_test_client(descriptor: AuthorityDescriptor) -> ReqwestTestClient {
		ReqwestTestClient::with_http_client(
			descriptor,
			ApplicationId::new(TEST_CLIENT_ID).expect("Client fixture should be valid."),
			Url::parse(TEST_REDIRECT_URI).expect("Redirect fixture should parse."),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_client_secret(TEST_CLIENT_SECRET)
	}

	/// Builds an unsigned JWT carrying the provided JSON payload.
	pub fn fake_id_token(payload_json: &str) -> String {
		use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

		let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(payload_json);

		format!("{header}.{payload}.")
	}

	/// Parses a whitespace-delimited scope string, panicking on invalid fixtures.
	pub fn scopes(value: &str) -> ScopeSet {
		ScopeSet::from_str(value).expect("Scope fixture should be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap, hash_map::DefaultHasher},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
