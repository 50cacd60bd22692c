//! Identity provider authority metadata and token error classification.
//!
//! `descriptor` holds validated HTTPS endpoints (authorize, token, logout), grant flags,
//! and the confidential client authentication preference. `classify` maps OAuth error
//! payloads from the token endpoint into [`ProviderErrorKind`](crate::error::ProviderErrorKind).

pub mod builder;
pub mod classify;
pub mod descriptor;
pub mod grant;

pub use builder::*;
pub use classify::*;
pub use descriptor::*;
pub use grant::*;
