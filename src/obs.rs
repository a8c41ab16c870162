//! Optional observability helpers for broker reconcilers.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `hil_broker.reconcile` with the `kind`
//!   (resource) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `hil_broker_reconcile_total` counter for every
//!   attempt/success/failure, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Resource kinds reconciled by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileKind {
	/// Lease matchmaking and lifecycle.
	Lease,
	/// Exporter health and credentials.
	Exporter,
	/// Client credentials.
	Client,
}
impl ReconcileKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ReconcileKind::Lease => "lease",
			ReconcileKind::Exporter => "exporter",
			ReconcileKind::Client => "client",
		}
	}
}
impl Display for ReconcileKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
	/// Entry to a reconciler.
	Attempt,
	/// Successful completion, including condition-only updates.
	Success,
	/// Failure propagated back to the controller framework.
	Failure,
}
impl ReconcileOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ReconcileOutcome::Attempt => "attempt",
			ReconcileOutcome::Success => "success",
			ReconcileOutcome::Failure => "failure",
		}
	}
}
impl Display for ReconcileOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
