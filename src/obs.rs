//! Optional observability helpers for manager operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_manager.op` with the `op`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `token_manager_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Manager operations observed for spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// `add` facade call.
	Add,
	/// `get` facade call.
	Get,
	/// `set_tokens` facade call.
	SetTokens,
	/// `remove` facade call.
	Remove,
	/// `clear` facade call.
	Clear,
	/// Renewal flow, caller- or scheduler-driven.
	Renew,
	/// Scheduler-driven expiry handling.
	Expire,
	/// Cross-tab storage-change handling.
	Sync,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Add => "add",
			OpKind::Get => "get",
			OpKind::SetTokens => "set_tokens",
			OpKind::Remove => "remove",
			OpKind::Clear => "clear",
			OpKind::Renew => "renew",
			OpKind::Expire => "expire",
			OpKind::Sync => "sync",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a manager operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller or the error channel.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
