//! Intake surface the data-plane front end calls into: heartbeats, lease CRUD validation,
//! and router registration.

// self
use crate::{
	_prelude::*,
	resource::{
		Device, Exporter, ExporterStatusValue, Lease, LeaseSpec, Namespace, ObjectMeta,
		ResourceKey, ResourceName,
	},
	store::{ResourceStore, StoreError},
};

/// Bounded retries applied to admission writes racing the reconcilers.
const WRITE_RETRIES: usize = 3;

/// One heartbeat or registration report from an exporter agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatReport {
	/// Device list refresh; `None` leaves the stored inventory untouched.
	pub devices: Option<Vec<Device>>,
	/// Connectivity the exporter reports about itself.
	pub status: ExporterStatusValue,
	/// Free-form message accompanying the report.
	pub message: Option<String>,
}
impl HeartbeatReport {
	/// Plain liveness heartbeat without a device refresh.
	pub fn alive() -> Self {
		Self { devices: None, status: ExporterStatusValue::Online, message: None }
	}

	/// Registration report refreshing the device inventory.
	pub fn registration(devices: Vec<Device>) -> Self {
		Self { devices: Some(devices), status: ExporterStatusValue::Online, message: None }
	}

	/// Graceful-shutdown announcement.
	pub fn shutdown(message: impl Into<String>) -> Self {
		Self { devices: None, status: ExporterStatusValue::Offline, message: Some(message.into()) }
	}
}

/// Records a heartbeat on the exporter's status subresource.
pub async fn record_heartbeat<S>(
	store: &S,
	key: &ResourceKey,
	report: HeartbeatReport,
	now: OffsetDateTime,
) -> Result<Exporter>
where
	S: ResourceStore,
{
	for attempt in 0.. {
		let mut exporter = store.get::<Exporter>(key).await?;

		exporter.status.last_seen = Some(now);
		exporter.status.reported_status = Some(report.status);
		exporter.status.message = report.message.clone();

		if let Some(devices) = report.devices.clone() {
			exporter.status.devices = Some(devices);
		}

		match store.update_status(exporter).await {
			Ok(exporter) => return Ok(exporter),
			Err(StoreError::Conflict { .. }) if attempt < WRITE_RETRIES => continue,
			Err(err) => return Err(err.into()),
		}
	}

	unreachable!("heartbeat retry loop always returns")
}

/// Validates the lease window and creates the record.
pub async fn create_lease<S>(
	store: &S,
	namespace: Namespace,
	name: ResourceName,
	spec: LeaseSpec,
) -> Result<Lease>
where
	S: ResourceStore,
{
	spec.window()?;

	Ok(store.create(Lease::new(ObjectMeta::new(namespace, name), spec)).await?)
}

/// Applies a client-driven spec update after validation.
///
/// The begin time is immutable once the lease holds an exporter; end time and duration may
/// be extended or shortened at any time, and shortening below the current instant ends the
/// lease at its next reconciliation.
pub async fn update_lease<S>(store: &S, key: &ResourceKey, spec: LeaseSpec) -> Result<Lease>
where
	S: ResourceStore,
{
	spec.window()?;

	for attempt in 0.. {
		let mut lease = store.get::<Lease>(key).await?;

		if lease.status.exporter_ref.is_some() && lease.spec.begin_time != spec.begin_time {
			return Err(Error::FailedPrecondition {
				reason: "begin time cannot change once an exporter is acquired".into(),
			});
		}

		lease.spec = spec.clone();

		match store.update(lease).await {
			Ok(lease) => return Ok(lease),
			Err(StoreError::Conflict { .. }) if attempt < WRITE_RETRIES => continue,
			Err(err) => return Err(err.into()),
		}
	}

	unreachable!("lease update retry loop always returns")
}

/// Flags the lease for early release at its next reconciliation.
pub async fn release_lease<S>(store: &S, key: &ResourceKey) -> Result<Lease>
where
	S: ResourceStore,
{
	for attempt in 0.. {
		let mut lease = store.get::<Lease>(key).await?;

		lease.spec.release = true;

		match store.update(lease).await {
			Ok(lease) => return Ok(lease),
			Err(StoreError::Conflict { .. }) if attempt < WRITE_RETRIES => continue,
			Err(err) => return Err(err.into()),
		}
	}

	unreachable!("lease release retry loop always returns")
}

/// One registered data-plane router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterEntry {
	/// Address clients and exporters dial for stream proxying.
	pub endpoint: String,
	/// Instant of the most recent registration.
	pub last_seen: OffsetDateTime,
}

/// In-process routing table keyed by router name; registration upserts.
#[derive(Debug, Default)]
pub struct RouterRegistry {
	routers: RwLock<HashMap<String, RouterEntry>>,
}
impl RouterRegistry {
	/// Registers or refreshes a router.
	pub fn register(&self, name: impl Into<String>, endpoint: impl Into<String>, now: OffsetDateTime) {
		self.routers
			.write()
			.insert(name.into(), RouterEntry { endpoint: endpoint.into(), last_seen: now });
	}

	/// Looks up a router by name.
	pub fn get(&self, name: &str) -> Option<RouterEntry> {
		self.routers.read().get(name).cloned()
	}

	/// Registered router names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.routers.read().keys().cloned().collect();

		names.sort();

		names
	}
}
