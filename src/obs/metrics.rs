// self
use crate::obs::{ReconcileKind, ReconcileOutcome};

/// Records a reconciliation outcome via the global metrics recorder (when enabled).
pub fn record_reconcile_outcome(kind: ReconcileKind, outcome: ReconcileOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"hil_broker_reconcile_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}
