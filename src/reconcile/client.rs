//! Client reconciliation: credential secrets and endpoint reporting.

// self
use crate::{
	_prelude::*,
	obs::{self, ReconcileKind, ReconcileOutcome, ReconcileSpan},
	reconcile::{Action, GuardMap, ReconcileStats, key_guard},
	resource::{Client, OwnerReference, Resource, ResourceKey, ResourceName},
	signer::CredentialKeeper,
	store::{ResourceStore, StoreError},
};

/// Ensures each client holds a valid bearer credential and knows the controller endpoint.
#[derive(Debug)]
pub struct ClientReconciler<S> {
	store: Arc<S>,
	keeper: CredentialKeeper,
	endpoint: String,
	stats: Arc<ReconcileStats>,
	guards: GuardMap,
}
impl<S> ClientReconciler<S>
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

	/// Reconciles the client under the key.
	pub async fn reconcile(&self, key: &ResourceKey) -> Result<Action> {
		const KIND: ReconcileKind = ReconcileKind::Client;

		let span = ReconcileSpan::new(KIND, "reconcile");

		obs::record_reconcile_outcome(KIND, ReconcileOutcome::Attempt);
		self.stats.record_attempt();

		let guard = key_guard(&self.guards, key);
		let _singleflight = guard.lock().await;
		let result = match span.instrument(self.reconcile_inner(key)).await {
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

	async fn reconcile_inner(&self, key: &ResourceKey) -> Result<Action> {
		let mut client = match self.store.get::<Client>(key).await {
			Ok(client) => client,
			Err(StoreError::NotFound { .. }) => return Ok(Action::await_change()),
			Err(err) => return Err(err.into()),
		};
		let original_status = client.status.clone();
		// Client credentials are owned: deleting the client garbage-collects its secret.
		let owner = OwnerReference::new(Client::KIND, client.metadata.name.clone());
		let secret_name = ResourceName::new(format!("{}-credential", client.metadata.name))?;
		let secret_key = ResourceKey::new(client.metadata.namespace.clone(), secret_name);
		let credential = self
			.keeper
			.ensure_secret(&*self.store, &secret_key, &client.internal_subject(), Some(owner))
			.await?;

		client.status.credential = Some(credential);
		client.status.endpoint = Some(self.endpoint.clone());

		if client.status != original_status {
			self.store.update_status(client).await?;
		}

		Ok(Action::await_change())
	}
}
