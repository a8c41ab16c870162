//! Shared record metadata: addressing keys, generations, labels, and owner references.

// self
use crate::{
	_prelude::*,
	resource::{Namespace, ResourceName},
};

/// Annotation marking a record as orphaned: cascading deletion of its owner leaves it in place.
pub const ORPHAN_ANNOTATION: &str = "hil-broker.dev/orphan";

/// Addressing key for a record: `(namespace, name)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
	/// Namespace component.
	pub namespace: Namespace,
	/// Name component.
	pub name: ResourceName,
}
impl ResourceKey {
	/// Builds a key from its components.
	pub fn new(namespace: Namespace, name: ResourceName) -> Self {
		Self { namespace, name }
	}
}
impl Display for ResourceKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.namespace, self.name)
	}
}

/// Reference from an owned record back to its owning record.
///
/// The store cascades deletion along these edges unless the owned record carries
/// [`ORPHAN_ANNOTATION`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
	/// Kind of the owning record.
	pub kind: String,
	/// Name of the owning record; the namespace is implied to match.
	pub name: ResourceName,
}
impl OwnerReference {
	/// Builds an owner reference to the provided kind + name.
	pub fn new(kind: impl Into<String>, name: ResourceName) -> Self {
		Self { kind: kind.into(), name }
	}
}

/// Metadata common to every record kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
	/// Namespace the record lives in.
	pub namespace: Namespace,
	/// Record name, unique within the namespace.
	pub name: ResourceName,
	/// Incremented by the store on every spec change.
	#[serde(default)]
	pub generation: u64,
	/// Optimistic-concurrency token assigned by the store on every commit.
	#[serde(default)]
	pub resource_version: Option<u64>,
	/// Queryable labels.
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
	/// Free-form annotations.
	#[serde(default)]
	pub annotations: BTreeMap<String, String>,
	/// Owner edges used for cascading garbage collection.
	#[serde(default)]
	pub owner_references: Vec<OwnerReference>,
}
impl ObjectMeta {
	/// Creates metadata for a new, never-persisted record.
	pub fn new(namespace: Namespace, name: ResourceName) -> Self {
		Self {
			namespace,
			name,
			generation: 0,
			resource_version: None,
			labels: BTreeMap::new(),
			annotations: BTreeMap::new(),
			owner_references: Vec::new(),
		}
	}

	/// Adds a label, replacing any previous value.
	pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.labels.insert(key.into(), value.into());

		self
	}

	/// Adds an owner reference.
	pub fn with_owner(mut self, owner: OwnerReference) -> Self {
		self.owner_references.push(owner);

		self
	}

	/// Marks the record as orphaned so cascading deletion skips it.
	pub fn with_orphan_annotation(mut self) -> Self {
		self.annotations.insert(ORPHAN_ANNOTATION.to_owned(), "true".to_owned());

		self
	}

	/// Returns `true` when the record carries the orphan annotation.
	pub fn is_orphaned(&self) -> bool {
		self.annotations.get(ORPHAN_ANNOTATION).is_some_and(|value| value == "true")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn meta() -> ObjectMeta {
		ObjectMeta::new(
			Namespace::new("lab").expect("Namespace fixture should be valid."),
			ResourceName::new("exporter-1").expect("Name fixture should be valid."),
		)
	}

	#[test]
	fn key_displays_as_namespace_slash_name() {
		let key = ResourceKey::new(meta().namespace, meta().name);

		assert_eq!(key.to_string(), "lab/exporter-1");
	}

	#[test]
	fn orphan_annotation_round_trips() {
		let plain = meta();

		assert!(!plain.is_orphaned());

		let orphaned = meta().with_orphan_annotation();

		assert!(orphaned.is_orphaned());
	}

	#[test]
	fn labels_and_owners_chain() {
		let owner = OwnerReference::new(
			"Exporter",
			ResourceName::new("exporter-1").expect("Owner name fixture should be valid."),
		);
		let meta = meta().with_label("dut", "a").with_owner(owner.clone());

		assert_eq!(meta.labels.get("dut").map(String::as_str), Some("a"));
		assert_eq!(meta.owner_references, vec![owner]);
	}
}
