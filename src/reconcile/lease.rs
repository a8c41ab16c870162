//! Lease reconciliation: matchmaking, claim, extension, early release, and expiry.
//!
//! The reconciler drives each lease through acquisition and teardown with singleflight
//! guards per lease key, a deterministic candidate order, and a two-write claim (lease
//! status first, exporter back-pointer second) so no partial claim survives a conflict.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	obs::{self, ReconcileKind, ReconcileOutcome, ReconcileSpan},
	policy::{ApprovedExporter, approved_exporters},
	reconcile::{Action, GuardMap, ReconcileStats, key_guard},
	resource::{
		Client, Condition, ConditionType, Exporter, ExporterAccessPolicy, LabelSelector, Lease,
		LeaseValidationError, LeaseWindow, Resource, ResourceKey, ResourceName, condition::reason,
	},
	store::{ResourceStore, StoreError},
};

/// One exporter considered during matchmaking, collapsed from its grants.
#[derive(Clone, Debug)]
pub struct Candidate<'a> {
	/// The exporter under consideration.
	pub exporter: &'a Exporter,
	/// Whether any lease currently holds the exporter.
	pub leased: bool,
	/// Whether the client reaches this exporter through spot grants only.
	pub spot: bool,
	/// Best applicable grant priority.
	pub priority: i32,
}

/// Orders matchmaking candidates by desirability.
///
/// Free exporters come before leased ones, dedicated grants before spot-only grants,
/// higher priorities first, and ties break on exporter name so two reconciles racing for
/// the same candidate converge under retry.
pub fn order_candidates<'a>(
	grants: &[ApprovedExporter<'a>],
	held: &BTreeSet<ResourceName>,
) -> Vec<Candidate<'a>> {
	let mut by_name: BTreeMap<ResourceName, Candidate<'a>> = BTreeMap::new();

	for grant in grants {
		let name = grant.exporter.metadata.name.clone();
		let leased = grant.existing_lease.is_some() || held.contains(&name);
		let entry = by_name.entry(name).or_insert(Candidate {
			exporter: grant.exporter,
			leased,
			spot: true,
			priority: i32::MIN,
		});

		if !grant.spot_access {
			if entry.spot {
				entry.spot = false;
				entry.priority = grant.priority;
			} else {
				entry.priority = entry.priority.max(grant.priority);
			}
		} else if entry.spot {
			entry.priority = entry.priority.max(grant.priority);
		}
	}

	let mut out: Vec<_> = by_name.into_values().collect();

	out.sort_by(|a, b| {
		a.leased
			.cmp(&b.leased)
			.then_with(|| a.spot.cmp(&b.spot))
			.then_with(|| b.priority.cmp(&a.priority))
			.then_with(|| a.exporter.metadata.name.cmp(&b.exporter.metadata.name))
	});

	out
}

/// Matchmakes pending leases onto exporters and drives acquisition, extension, early
/// release, and expiry.
#[derive(Debug)]
pub struct LeaseReconciler<S> {
	store: Arc<S>,
	stats: Arc<ReconcileStats>,
	guards: GuardMap,
}
impl<S> LeaseReconciler<S>
where
	S: ResourceStore,
{
	/// Creates a reconciler against the provided store.
	pub fn new(store: Arc<S>) -> Self {
		Self { store, stats: Default::default(), guards: Default::default() }
	}

	/// Counters for attempts, successes, failures, and absorbed conflicts.
	pub fn stats(&self) -> &ReconcileStats {
		&self.stats
	}

	/// Reconciles the lease under the key against the current clock.
	pub async fn reconcile(&self, key: &ResourceKey) -> Result<Action> {
		self.reconcile_at(key, OffsetDateTime::now_utc()).await
	}

	/// Reconciles the lease under the key, treating `now` as the current instant.
	pub async fn reconcile_at(&self, key: &ResourceKey, now: OffsetDateTime) -> Result<Action> {
		const KIND: ReconcileKind = ReconcileKind::Lease;

		let span = ReconcileSpan::new(KIND, "reconcile");

		obs::record_reconcile_outcome(KIND, ReconcileOutcome::Attempt);
		self.stats.record_attempt();

		let guard = key_guard(&self.guards, key);
		let _singleflight = guard.lock().await;
		let result = match span.instrument(self.reconcile_inner(key, now)).await {
			// Conflicts are not failures: another writer won the race; re-read and retry.
			Err(err) if err.is_conflict() => {
				self.stats.record_conflict();

				Ok(Action::immediate())
			},
			other => other,
		};

		match &result {
			Ok(_) => {
				self.stats.record_success();
				obs::record_reconcile_outcome(KIND, ReconcileOutcome::Success);
			},
			Err(_) => {
				self.stats.record_failure();
				obs::record_reconcile_outcome(KIND, ReconcileOutcome::Failure);
			},
		}

		result
	}

	async fn reconcile_inner(&self, key: &ResourceKey, now: OffsetDateTime) -> Result<Action> {
		let lease = match self.store.get::<Lease>(key).await {
			Ok(lease) => lease,
			// Deleted between trigger and read; the next watch event re-drives.
			Err(StoreError::NotFound { .. }) => return Ok(Action::await_change()),
			Err(err) => return Err(err.into()),
		};

		if lease.status.ended {
			return self.finalize_ended(lease).await;
		}
		if lease.spec.release {
			return self.end_lease(lease, now, now, reason::RELEASED, "Lease was released by its client.").await;
		}

		let window = match lease.spec.window() {
			Ok(window) => window,
			Err(err) => return self.mark_invalid(lease, err, now).await,
		};

		if lease.status.exporter_ref.is_some() {
			return self.reconcile_active(lease, now).await;
		}
		if lease.spec.selector.is_empty() {
			return self.mark_invalid(lease, LeaseValidationError::EmptySelector, now).await;
		}

		self.reconcile_pending(lease, window, now).await
	}

	/// A lease that never matched and whose end has already passed ends without acquiring.
	async fn reconcile_pending(
		&self,
		lease: Lease,
		window: LeaseWindow,
		now: OffsetDateTime,
	) -> Result<Action> {
		if window.end_time.is_some_and(|end| end <= now) {
			return self.end_lease(lease, now, now, reason::EXPIRED, "Lease end time has already passed.").await;
		}
		if let Some(begin) = lease.spec.begin_time
			&& begin > now
		{
			let action = Action::requeue_at(now, begin);
			let mut lease = lease;

			raise_phase(
				&mut lease,
				ConditionType::Pending,
				reason::SCHEDULED,
				"Waiting for begin time.",
				now,
			);
			self.patch_status_if_changed(lease).await?;

			return Ok(action);
		}

		let namespace = lease.metadata.namespace.clone();
		let client_key = ResourceKey::new(namespace.clone(), lease.spec.client_ref.clone());
		let client = match self.store.get::<Client>(&client_key).await {
			Ok(client) => client,
			// Default-deny: without an identity record there is nothing a policy can grant.
			Err(StoreError::NotFound { .. }) => {
				let mut lease = lease;

				raise_phase(
					&mut lease,
					ConditionType::Unsatisfiable,
					reason::NO_ACCESS,
					"Client record was not found.",
					now,
				);
				self.patch_status_if_changed(lease).await?;

				return Ok(Action::await_change());
			},
			Err(err) => return Err(err.into()),
		};
		let matching = self
			.store
			.list::<Exporter>(Some(&namespace), &lease.spec.selector)
			.await?;

		if matching.is_empty() {
			let mut lease = lease;

			raise_phase(
				&mut lease,
				ConditionType::Unsatisfiable,
				reason::NO_MATCH,
				"No exporter matches the selector.",
				now,
			);
			self.patch_status_if_changed(lease).await?;

			return Ok(Action::await_change());
		}

		let policies = self
			.store
			.list::<ExporterAccessPolicy>(Some(&namespace), &LabelSelector::default())
			.await?;
		let grants = approved_exporters(&policies, &client, &matching, now);

		if grants.is_empty() {
			let mut lease = lease;

			raise_phase(
				&mut lease,
				ConditionType::Unsatisfiable,
				reason::NO_ACCESS,
				"No policy grants the client access to a matching exporter.",
				now,
			);
			self.patch_status_if_changed(lease).await?;

			return Ok(Action::await_change());
		}

		let online: Vec<_> = grants
			.into_iter()
			.filter(|grant| grant.exporter.is_online_at(now))
			.collect();

		if online.is_empty() {
			let mut lease = lease;

			raise_phase(
				&mut lease,
				ConditionType::Pending,
				reason::OFFLINE,
				"Matching exporters exist but none is online.",
				now,
			);
			self.patch_status_if_changed(lease).await?;

			return Ok(Action::await_change());
		}

		let held = self.held_exporters(&lease).await?;
		let candidates = order_candidates(&online, &held);
		let Some(free) = candidates.iter().find(|candidate| !candidate.leased) else {
			let mut lease = lease;

			raise_phase(
				&mut lease,
				ConditionType::Pending,
				reason::NOT_AVAILABLE,
				"matching exporters exist but all are leased",
				now,
			);
			self.patch_status_if_changed(lease).await?;

			return Ok(Action::await_change());
		};

		self.claim(lease, window, free.exporter.clone(), now).await
	}

	/// Exporters currently held by some other non-ended lease, by indexed label query.
	async fn held_exporters(&self, lease: &Lease) -> Result<BTreeSet<ResourceName>> {
		let active = self
			.store
			.list::<Lease>(Some(&lease.metadata.namespace), &Lease::active_selector())
			.await?;

		Ok(active
			.into_iter()
			.filter(|other| other.metadata.name != lease.metadata.name && !other.status.ended)
			.filter_map(|other| other.status.exporter_ref)
			.collect())
	}

	/// Claims the exporter: the lease status commits first, then the exporter back-pointer.
	/// Either write conflicting aborts the whole attempt; retries re-run matchmaking.
	async fn claim(
		&self,
		mut lease: Lease,
		window: LeaseWindow,
		mut exporter: Exporter,
		now: OffsetDateTime,
	) -> Result<Action> {
		let end = match (window.duration, window.end_time) {
			(Some(duration), Some(end)) => (now + duration).min(end),
			(Some(duration), None) => now + duration,
			(None, Some(end)) => end,
			(None, None) => return self.mark_invalid(lease, LeaseValidationError::MissingWindow, now).await,
		};

		lease.status.exporter_ref = Some(exporter.metadata.name.clone());
		lease.status.begin_time = Some(now);
		lease.status.end_time = Some(end);

		raise_phase(
			&mut lease,
			ConditionType::Ready,
			reason::ACQUIRED,
			format!("Lease acquired exporter {}.", exporter.metadata.name),
			now,
		);

		let lease = self.store.update_status(lease).await?;

		exporter.status.lease_ref = Some(lease.metadata.name.clone());
		self.store.update_status(exporter).await?;

		Ok(Action::requeue_at(now, end))
	}

	async fn reconcile_active(&self, lease: Lease, now: OffsetDateTime) -> Result<Action> {
		let Some(effective_end) = lease.effective_end() else {
			return Ok(Action::await_change());
		};

		if now >= effective_end {
			return self
				.end_lease(lease, now, effective_end, reason::EXPIRED, "Lease reached its effective end.")
				.await;
		}

		let mut lease = lease;

		raise_phase(
			&mut lease,
			ConditionType::Ready,
			reason::ACQUIRED,
			"Lease is active.",
			now,
		);
		self.patch_status_if_changed(lease).await?;

		Ok(Action::requeue_at(now, effective_end))
	}

	/// Ends the lease: the exporter back-pointer is cleared before the terminal status
	/// commits, so a crash between the two writes converges on retry.
	async fn end_lease(
		&self,
		mut lease: Lease,
		now: OffsetDateTime,
		end_at: OffsetDateTime,
		why: &'static str,
		message: &str,
	) -> Result<Action> {
		self.release_exporter(&lease).await?;

		lease.status.ended = true;
		lease.status.end_time = Some(end_at.min(now));

		lower_condition(&mut lease, ConditionType::Pending, why, now);
		upsert_status_condition(&mut lease, ConditionType::Ready, false, why, message, now);

		let mut lease = self.store.update_status(lease).await?;

		lease.mark_ended_label();
		self.store.update(lease).await?;

		Ok(Action::await_change())
	}

	/// Clears the exporter's back-pointer when it still names this lease.
	async fn release_exporter(&self, lease: &Lease) -> Result<()> {
		let Some(exporter_name) = lease.status.exporter_ref.clone() else {
			return Ok(());
		};
		let key = ResourceKey::new(lease.metadata.namespace.clone(), exporter_name);
		let mut exporter = match self.store.get::<Exporter>(&key).await {
			Ok(exporter) => exporter,
			Err(StoreError::NotFound { .. }) => return Ok(()),
			Err(err) => return Err(err.into()),
		};

		if exporter.status.lease_ref.as_ref() == Some(&lease.metadata.name) {
			exporter.status.lease_ref = None;

			self.store.update_status(exporter).await?;
		}

		Ok(())
	}

	/// Ended leases converge: the bookkeeping label is stamped and no exporter keeps a
	/// back-pointer, even if a previous reconciliation stopped between writes.
	async fn finalize_ended(&self, lease: Lease) -> Result<Action> {
		self.release_exporter(&lease).await?;

		if !lease.has_ended_label() {
			let mut lease = lease;

			lease.mark_ended_label();
			self.store.update(lease).await?;
		}

		Ok(Action::await_change())
	}

	async fn mark_invalid(
		&self,
		mut lease: Lease,
		err: LeaseValidationError,
		now: OffsetDateTime,
	) -> Result<Action> {
		raise_phase(&mut lease, ConditionType::Invalid, err.reason(), err.to_string(), now);
		self.patch_status_if_changed(lease).await?;

		// Terminal for this spec generation; only a spec change re-drives.
		Ok(Action::await_change())
	}

	async fn patch_status_if_changed(&self, lease: Lease) -> Result<()> {
		let current = self.store.get::<Lease>(&lease.key()).await?;

		if current.status != lease.status {
			self.store.update_status(lease).await?;
		}

		Ok(())
	}
}

/// Raises one phase condition and lowers the other phase conditions that currently hold.
fn raise_phase(
	lease: &mut Lease,
	condition_type: ConditionType,
	why: &'static str,
	message: impl Into<String>,
	now: OffsetDateTime,
) {
	const PHASES: [ConditionType; 4] = [
		ConditionType::Ready,
		ConditionType::Pending,
		ConditionType::Unsatisfiable,
		ConditionType::Invalid,
	];

	for phase in PHASES {
		if phase != condition_type {
			lower_condition(lease, phase, why, now);
		}
	}

	upsert_status_condition(lease, condition_type, true, why, message, now);
}

/// Lowers an existing condition without introducing one that was never set.
fn lower_condition(lease: &mut Lease, condition_type: ConditionType, why: &'static str, now: OffsetDateTime) {
	let holds = crate::resource::condition_holds(&lease.status.conditions, condition_type);

	if holds {
		upsert_status_condition(lease, condition_type, false, why, "", now);
	}
}

fn upsert_status_condition(
	lease: &mut Lease,
	condition_type: ConditionType,
	status: bool,
	why: &str,
	message: impl Into<String>,
	now: OffsetDateTime,
) {
	let generation = lease.metadata.generation;

	crate::resource::upsert_condition(
		&mut lease.status.conditions,
		Condition::new(condition_type, status, why, message, generation, now),
	);
}
