//! HTTP function backend.

// crates.io
use reqwest::header::AUTHORIZATION;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	backend::{BackendFuture, BackendInvoker, RawResult},
};

/// Calls an HTTP endpoint with `GET`, the bearer token, and a `name` query parameter.
#[derive(Clone, Debug)]
pub struct FunctionInvoker {
	client: ReqwestClient,
	url: Url,
}
impl FunctionInvoker {
	/// Creates an invoker for `url`; existing query parameters (such as a function key) are
	/// kept.
	pub fn new(client: ReqwestClient, url: Url) -> Self {
		Self { client, url }
	}

	/// Target URL for `resource`.
	pub fn target(&self, resource: Option<&str>) -> Url {
		let mut url = self.url.clone();

		if let Some(name) = resource {
			url.query_pairs_mut().append_pair("name", name);
		}

		url
	}
}
impl BackendInvoker for FunctionInvoker {
	fn invoke<'a>(
		&'a self,
		bearer: &'a TokenSecret,
		resource: Option<&'a str>,
	) -> BackendFuture<'a, RawResult> {
		Box::pin(async move {
			let response = self
				.client
				.get(self.target(resource))
				.header(AUTHORIZATION, bearer.bearer_header())
				.send()
				.await?;
			let status = response.status().as_u16();
			let body = response.text().await?;

			#[cfg(feature = "tracing")]
			tracing::debug!(status, "function backend answered");

			Ok(RawResult::Http { status, body })
		})
	}
}
