//! Client identity records.

// self
use crate::{
	_prelude::*,
	resource::{ObjectMeta, Resource, SecretRef},
};

/// Requester-supplied client spec; identity labels live in metadata so access policies can
/// select on them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {}

/// Reconciler-owned client status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
	/// Secret holding the client's bearer credential.
	#[serde(default)]
	pub credential: Option<SecretRef>,
	/// Advertised controller endpoint the client should dial.
	#[serde(default)]
	pub endpoint: Option<String>,
}

/// Identity record for a lease requester.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
	/// Shared record metadata; identity labels live here.
	pub metadata: ObjectMeta,
	/// Requester-supplied spec.
	#[serde(default)]
	pub spec: ClientSpec,
	/// Reconciler-owned status.
	#[serde(default)]
	pub status: ClientStatus,
}
impl Client {
	/// Creates a client record from metadata.
	pub fn new(metadata: ObjectMeta) -> Self {
		Self { metadata, spec: ClientSpec::default(), status: ClientStatus::default() }
	}

	/// Stable internal identity string bound into issued credentials.
	pub fn internal_subject(&self) -> String {
		format!("client:{}:{}", self.metadata.namespace, self.metadata.name)
	}
}
impl Resource for Client {
	const KIND: &'static str = "Client";

	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}

	fn metadata_mut(&mut self) -> &mut ObjectMeta {
		&mut self.metadata
	}
}
