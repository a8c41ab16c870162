//! Exporter records: heartbeat tracking, device inventory, and the lease back-pointer.

// self
use crate::{
	_prelude::*,
	resource::{Condition, ObjectMeta, Resource, ResourceName, SecretRef},
};

/// Staleness window after which an exporter without a fresh heartbeat is considered offline.
pub const HEARTBEAT_STALENESS: Duration = Duration::minutes(1);
/// Interval at which online exporters are re-evaluated for staleness.
pub const ONLINE_REEVALUATE_INTERVAL: Duration = Duration::seconds(30);

/// Connectivity value an exporter reports about itself on the heartbeat surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExporterStatusValue {
	/// Exporter is serving.
	Online,
	/// Exporter announced a graceful shutdown.
	Offline,
}

/// One device descriptor reported by an exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
	/// Stable device identifier.
	pub uuid: String,
	/// Parent device identifier for composite devices.
	#[serde(default)]
	pub parent_uuid: Option<String>,
	/// Device labels advertised to clients.
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
}

/// Administrator-supplied exporter spec; the DUT description lives in metadata labels so it
/// stays queryable by lease selectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterSpec {}

/// Reconciler-owned exporter status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterStatus {
	/// Secret holding the exporter's bearer credential.
	#[serde(default)]
	pub credential: Option<SecretRef>,
	/// Instant of the most recent heartbeat.
	#[serde(default)]
	pub last_seen: Option<OffsetDateTime>,
	/// Devices reported by the exporter; `None` means the exporter never registered.
	#[serde(default)]
	pub devices: Option<Vec<Device>>,
	/// Active lease holding this exporter, if any.
	#[serde(default)]
	pub lease_ref: Option<ResourceName>,
	/// Advertised controller endpoint clients should dial.
	#[serde(default)]
	pub endpoint: Option<String>,
	/// Connectivity value last reported by the exporter itself.
	#[serde(default)]
	pub reported_status: Option<ExporterStatusValue>,
	/// Free-form message accompanying the reported status.
	#[serde(default)]
	pub message: Option<String>,
	/// Structured conditions (`Online`, `Registered`).
	#[serde(default)]
	pub conditions: Vec<Condition>,
}

/// Identity record for one hardware host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exporter {
	/// Shared record metadata; DUT labels live here.
	pub metadata: ObjectMeta,
	/// Administrator-supplied spec.
	#[serde(default)]
	pub spec: ExporterSpec,
	/// Reconciler-owned status.
	#[serde(default)]
	pub status: ExporterStatus,
}
impl Exporter {
	/// Creates an exporter record from metadata.
	pub fn new(metadata: ObjectMeta) -> Self {
		Self { metadata, spec: ExporterSpec::default(), status: ExporterStatus::default() }
	}

	/// Stable internal identity string bound into issued credentials.
	pub fn internal_subject(&self) -> String {
		format!("exporter:{}:{}", self.metadata.namespace, self.metadata.name)
	}

	/// Evaluates liveness at the provided instant: a fresh heartbeat and no self-reported
	/// shutdown.
	pub fn is_online_at(&self, now: OffsetDateTime) -> bool {
		let fresh = self
			.status
			.last_seen
			.is_some_and(|last_seen| now - last_seen <= HEARTBEAT_STALENESS);

		fresh && self.status.reported_status != Some(ExporterStatusValue::Offline)
	}

	/// Returns `true` once the exporter has reported a device list.
	pub fn is_registered(&self) -> bool {
		self.status.devices.is_some()
	}
}
impl Resource for Exporter {
	const KIND: &'static str = "Exporter";

	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}

	fn metadata_mut(&mut self) -> &mut ObjectMeta {
		&mut self.metadata
	}
}
