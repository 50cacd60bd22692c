//! Observability hooks for token acquisition.
//!
//! # Feature Flags
//!
//! - `tracing` (default) wraps each acquisition in a span named `oauth2_session_gate.flow`
//!   carrying `flow` and `stage` fields.
//! - `metrics` increments `oauth2_session_gate_flow_total`, labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Token acquisition paths the crate instruments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Redeeming an authorization code on the sign-in callback.
	AuthorizationCode,
	/// Serving a delegated token from the session cache.
	Silent,
	/// Redeeming a cached refresh token.
	Refresh,
	/// App-only client-credentials acquisition.
	ClientCredentials,
}
impl FlowKind {
	/// Stable label for span fields and metric labels.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Silent => "silent",
			FlowKind::Refresh => "refresh",
			FlowKind::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Acquisition started.
	Attempt,
	/// A token was returned.
	Success,
	/// Nothing usable was cached and no refresh token was available.
	Miss,
	/// An error was returned.
	Failure,
}
impl FlowOutcome {
	/// Stable label for span fields and metric labels.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Miss => "miss",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
