//! Exporter reconciliation: heartbeat-driven health, registration, credentials, and the
//! lease back-pointer.

// self
use crate::{
	_prelude::*,
	obs::{self, ReconcileKind, ReconcileOutcome, ReconcileSpan},
	reconcile::{Action, GuardMap, ReconcileStats, key_guard},
	resource::{
		Condition, ConditionType, Exporter, ExporterStatusValue, HEARTBEAT_STALENESS, Lease,
		ONLINE_REEVALUATE_INTERVAL, ResourceKey, ResourceName, condition::reason,
		upsert_condition,
	},
	signer::CredentialKeeper,
	store::{ResourceStore, StoreError},
};

/// Tracks exporter health, maintains the credential secret and lease back-pointer, and
/// reports the advertised endpoint.
#[derive(Debug)]
pub struct ExporterReconciler<S> {
	store: Arc<S>,
	keeper: CredentialKeeper,
	endpoint: String,
	stats: Arc<ReconcileStats>,
	guards: GuardMap,
}
impl<S> ExporterReconciler<S>
where
	S: ResourceStore,
{
	/// Creates a reconciler against the provided store, credential keeper, and advertised
	/// endpoint.
	pub fn new(store: Arc<S>, keeper: CredentialKeeper, endpoint: String) -> Self {
		Self { store, keeper, endpoint, stats: Default::default(), guards: Default::default() }
	}

	/// Counters for attempts, successes, failures, and absorbed conflicts.
	pub fn stats(&self) -> &ReconcileStats {
		&self.stats
	}

	/// Reconciles the exporter under the key against the current clock.
	pub async fn reconcile(&self, key: &ResourceKey) -> Result<Action> {
		self.reconcile_at(key, OffsetDateTime::now_utc()).await
	}

	/// Reconciles the exporter under the key, treating `now` as the current instant.
	pub async fn reconcile_at(&self, key: &ResourceKey, now: OffsetDateTime) -> Result<Action> {
		const KIND: ReconcileKind = ReconcileKind::Exporter;

		let span = ReconcileSpan::new(KIND, "reconcile");

		obs::record_reconcile_outcome(KIND, ReconcileOutcome::Attempt);
		self.stats.record_attempt();

		let guard = key_guard(&self.guards, key);
		let _singleflight = guard.lock().await;
		let result = match span.instrument(self.reconcile_inner(key, now)).await {
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
		let mut exporter = match self.store.get::<Exporter>(key).await {
			Ok(exporter) => exporter,
			Err(StoreError::NotFound { .. }) => return Ok(Action::await_change()),
			Err(err) => return Err(err.into()),
		};
		let original_status = exporter.status.clone();

		// Exporter credentials are orphaned: recreating the record must not rotate keys.
		let secret_name = ResourceName::new(format!("{}-credential", exporter.metadata.name))?;
		let secret_key = ResourceKey::new(exporter.metadata.namespace.clone(), secret_name);
		let credential = self
			.keeper
			.ensure_secret(&*self.store, &secret_key, &exporter.internal_subject(), None)
			.await?;

		exporter.status.credential = Some(credential);
		exporter.status.endpoint = Some(self.endpoint.clone());
		exporter.status.lease_ref = self.adopt_lease(&exporter).await?;

		let online = self.evaluate_online(&mut exporter, now);

		self.evaluate_registered(&mut exporter, now);

		if exporter.status != original_status {
			self.store.update_status(exporter).await?;
		}

		// Online exporters re-evaluate staleness on a timer; offline ones wait for the next
		// heartbeat event.
		if online { Ok(Action::requeue(ONLINE_REEVALUATE_INTERVAL)) } else { Ok(Action::await_change()) }
	}

	/// Adopts the first non-ended lease referencing this exporter, by indexed label query.
	async fn adopt_lease(&self, exporter: &Exporter) -> Result<Option<ResourceName>> {
		let active = self
			.store
			.list::<Lease>(Some(&exporter.metadata.namespace), &Lease::active_selector())
			.await?;

		Ok(active
			.into_iter()
			.filter(|lease| !lease.status.ended)
			.find(|lease| lease.status.exporter_ref.as_ref() == Some(&exporter.metadata.name))
			.map(|lease| lease.metadata.name))
	}

	fn evaluate_online(&self, exporter: &mut Exporter, now: OffsetDateTime) -> bool {
		let generation = exporter.metadata.generation;
		let condition = match exporter.status.last_seen {
			None =>
				Condition::new(ConditionType::Online, false, reason::SEEN, "Never seen", generation, now),
			Some(last_seen) if now - last_seen > HEARTBEAT_STALENESS => Condition::new(
				ConditionType::Online,
				false,
				reason::SEEN,
				"Last seen more than 1 minute ago",
				generation,
				now,
			),
			_ if exporter.status.reported_status == Some(ExporterStatusValue::Offline) =>
				Condition::new(
					ConditionType::Online,
					false,
					reason::OFFLINE,
					exporter.status.message.clone().unwrap_or_else(|| "Exporter reported offline".to_owned()),
					generation,
					now,
				),
			_ => Condition::new(
				ConditionType::Online,
				true,
				reason::SEEN,
				"Heartbeat is fresh",
				generation,
				now,
			),
		};
		let online = condition.status;

		upsert_condition(&mut exporter.status.conditions, condition);

		online
	}

	fn evaluate_registered(&self, exporter: &mut Exporter, now: OffsetDateTime) {
		let registered = exporter.is_registered();
		let message = if registered { "Device list is reported" } else { "No device list reported" };
		let condition = Condition::new(
			ConditionType::Registered,
			registered,
			reason::REGISTERED,
			message,
			exporter.metadata.generation,
			now,
		);

		upsert_condition(&mut exporter.status.conditions, condition);
	}
}
