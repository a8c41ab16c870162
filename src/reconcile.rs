//! Reconciler scaffolding: requeue actions, per-key singleflight guards, and counters.

pub mod client;
pub mod exporter;
pub mod lease;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, resource::ResourceKey};

/// Result of one reconciliation attempt.
///
/// A reconciler either schedules its own wake-up at the earliest relevant deadline or waits
/// for the next watch event on the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Action {
	requeue_after: Option<Duration>,
}
impl Action {
	/// Re-runs the reconciliation after the provided delay even without a watch event.
	pub fn requeue(delay: Duration) -> Self {
		Self { requeue_after: Some(if delay.is_negative() { Duration::ZERO } else { delay }) }
	}

	/// Re-runs the reconciliation at the provided wall-clock deadline.
	pub fn requeue_at(now: OffsetDateTime, deadline: OffsetDateTime) -> Self {
		Self::requeue(deadline - now)
	}

	/// Re-runs the reconciliation as soon as a worker is free.
	pub fn immediate() -> Self {
		Self::requeue(Duration::ZERO)
	}

	/// Does nothing until a change to the resource (or a related resource) is detected.
	pub fn await_change() -> Self {
		Self { requeue_after: None }
	}

	/// The requested delay, if any.
	pub fn requeue_after(&self) -> Option<Duration> {
		self.requeue_after
	}
}

/// Thread-safe counters for reconciliation attempts.
#[derive(Debug, Default)]
pub struct ReconcileStats {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	conflicts: AtomicU64,
}
impl ReconcileStats {
	/// Returns the total number of reconciliation attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful reconciliations (including condition-only updates).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed reconciliations.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of optimistic-concurrency conflicts absorbed into requeues.
	pub fn conflicts(&self) -> u64 {
		self.conflicts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_conflict(&self) {
		self.conflicts.fetch_add(1, Ordering::Relaxed);
	}
}

pub(crate) type GuardMap = Mutex<HashMap<ResourceKey, Arc<AsyncMutex<()>>>>;

/// Returns (and creates on demand) the singleflight guard for a resource key.
pub(crate) fn key_guard(guards: &GuardMap, key: &ResourceKey) -> Arc<AsyncMutex<()>> {
	let mut guards = guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}
