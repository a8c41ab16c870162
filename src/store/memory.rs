//! Thread-safe in-memory [`ResourceStore`] implementation for local development and tests.

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	resource::{LabelSelector, Namespace, ObjectMeta, Resource, ResourceKey},
	store::{EventAction, ResourceStore, StoreError, StoreEvent, StoreFuture},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StoredKey {
	kind: &'static str,
	key: ResourceKey,
}

#[derive(Debug, Default)]
struct Shared {
	records: HashMap<StoredKey, Value>,
	revision: u64,
	events: Vec<StoreEvent>,
}
impl Shared {
	fn next_revision(&mut self) -> u64 {
		self.revision += 1;

		self.revision
	}

	fn push_event(&mut self, revision: u64, kind: &'static str, key: ResourceKey, action: EventAction) {
		self.events.push(StoreEvent { revision, kind, key, action });
	}
}

type SharedMap = Arc<RwLock<Shared>>;

/// Thread-safe storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedMap);
impl MemoryStore {
	fn encode<R>(resource: &R) -> Result<Value, StoreError>
	where
		R: Resource,
	{
		serde_json::to_value(resource)
			.map_err(|err| StoreError::Serialization { message: err.to_string() })
	}

	fn decode<R>(value: Value) -> Result<R, StoreError>
	where
		R: Resource,
	{
		serde_path_to_error::deserialize(value)
			.map_err(|err| StoreError::Serialization { message: err.to_string() })
	}

	fn stored_metadata(value: &Value) -> Result<ObjectMeta, StoreError> {
		serde_json::from_value(value.get("metadata").cloned().unwrap_or(Value::Null))
			.map_err(|err| StoreError::Serialization { message: err.to_string() })
	}

	fn check_version(
		kind: &'static str,
		key: &ResourceKey,
		incoming: Option<u64>,
		stored: &ObjectMeta,
	) -> Result<(), StoreError> {
		if incoming != stored.resource_version {
			return Err(StoreError::Conflict { kind, key: key.to_string() });
		}

		Ok(())
	}

	fn create_now<R>(map: SharedMap, mut resource: R) -> Result<R, StoreError>
	where
		R: Resource,
	{
		let key = resource.key();
		let stored_key = StoredKey { kind: R::KIND, key: key.clone() };
		let mut guard = map.write();

		if guard.records.contains_key(&stored_key) {
			return Err(StoreError::AlreadyExists { kind: R::KIND, key: key.to_string() });
		}

		let revision = guard.next_revision();
		let meta = resource.metadata_mut();

		meta.generation = 1;
		meta.resource_version = Some(revision);

		guard.records.insert(stored_key, Self::encode(&resource)?);
		guard.push_event(revision, R::KIND, key, EventAction::Created);

		Ok(resource)
	}

	fn get_now<R>(map: SharedMap, key: ResourceKey) -> Result<R, StoreError>
	where
		R: Resource,
	{
		let stored_key = StoredKey { kind: R::KIND, key: key.clone() };

		match map.read().records.get(&stored_key) {
			Some(value) => Self::decode(value.clone()),
			None => Err(StoreError::NotFound { kind: R::KIND, key: key.to_string() }),
		}
	}

	fn update_now<R>(map: SharedMap, resource: R) -> Result<R, StoreError>
	where
		R: Resource,
	{
		let key = resource.key();
		let stored_key = StoredKey { kind: R::KIND, key: key.clone() };
		let mut guard = map.write();
		let stored = guard
			.records
			.get(&stored_key)
			.ok_or_else(|| StoreError::NotFound { kind: R::KIND, key: key.to_string() })?
			.clone();
		let stored_meta = Self::stored_metadata(&stored)?;

		Self::check_version(R::KIND, &key, resource.metadata().resource_version, &stored_meta)?;

		let mut incoming = Self::encode(&resource)?;
		let spec_changed = incoming.get("spec") != stored.get("spec");
		let generation =
			if spec_changed { stored_meta.generation + 1 } else { stored_meta.generation };
		let revision = guard.next_revision();

		incoming["metadata"]["generation"] = json!(generation);
		incoming["metadata"]["resource_version"] = json!(revision);
		// Status is a subresource: spec writes never touch it.
		incoming["status"] = stored.get("status").cloned().unwrap_or(Value::Null);

		let merged = Self::decode::<R>(incoming.clone())?;

		guard.records.insert(stored_key, incoming);
		guard.push_event(revision, R::KIND, key, EventAction::Updated);

		Ok(merged)
	}

	fn update_status_now<R>(map: SharedMap, resource: R) -> Result<R, StoreError>
	where
		R: Resource,
	{
		let key = resource.key();
		let stored_key = StoredKey { kind: R::KIND, key: key.clone() };
		let mut guard = map.write();
		let stored = guard
			.records
			.get(&stored_key)
			.ok_or_else(|| StoreError::NotFound { kind: R::KIND, key: key.to_string() })?
			.clone();
		let stored_meta = Self::stored_metadata(&stored)?;

		Self::check_version(R::KIND, &key, resource.metadata().resource_version, &stored_meta)?;

		let incoming = Self::encode(&resource)?;
		let revision = guard.next_revision();
		let mut merged = stored;

		merged["metadata"]["resource_version"] = json!(revision);
		merged["status"] = incoming.get("status").cloned().unwrap_or(Value::Null);

		let decoded = Self::decode::<R>(merged.clone())?;

		guard.records.insert(stored_key, merged);
		guard.push_event(revision, R::KIND, key, EventAction::Updated);

		Ok(decoded)
	}

	fn delete_now<R>(map: SharedMap, key: ResourceKey) -> Result<Option<R>, StoreError>
	where
		R: Resource,
	{
		let stored_key = StoredKey { kind: R::KIND, key: key.clone() };
		let mut guard = map.write();
		let Some(removed) = guard.records.remove(&stored_key) else {
			return Ok(None);
		};
		let revision = guard.next_revision();

		guard.push_event(revision, R::KIND, key.clone(), EventAction::Deleted);

		// Cascade along owner references until a pass removes nothing; orphaned records stay.
		let mut deleted = vec![(R::KIND.to_owned(), key.clone())];

		loop {
			let mut doomed = Vec::new();

			for (candidate_key, value) in &guard.records {
				let meta = Self::stored_metadata(value)?;

				if meta.is_orphaned() {
					continue;
				}
				if meta.owner_references.iter().any(|owner| {
					deleted.iter().any(|(kind, owner_key)| {
						owner.kind == *kind
							&& owner.name == owner_key.name
							&& candidate_key.key.namespace == owner_key.namespace
					})
				}) {
					doomed.push(candidate_key.clone());
				}
			}

			if doomed.is_empty() {
				break;
			}

			for stored_key in doomed {
				guard.records.remove(&stored_key);

				let revision = guard.next_revision();

				guard.push_event(
					revision,
					stored_key.kind,
					stored_key.key.clone(),
					EventAction::Deleted,
				);
				deleted.push((stored_key.kind.to_owned(), stored_key.key));
			}
		}

		Self::decode(removed).map(Some)
	}

	fn list_now<R>(
		map: SharedMap,
		namespace: Option<Namespace>,
		selector: LabelSelector,
	) -> Result<Vec<R>, StoreError>
	where
		R: Resource,
	{
		let guard = map.read();
		let mut out = Vec::new();

		for (stored_key, value) in &guard.records {
			if stored_key.kind != R::KIND {
				continue;
			}
			if namespace.as_ref().is_some_and(|namespace| stored_key.key.namespace != *namespace) {
				continue;
			}

			let resource = Self::decode::<R>(value.clone())?;

			if selector.matches(&resource.metadata().labels) {
				out.push(resource);
			}
		}

		out.sort_by(|a, b| a.metadata().name.cmp(&b.metadata().name));

		Ok(out)
	}
}
impl ResourceStore for MemoryStore {
	fn create<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource,
	{
		let map = self.0.clone();

		Box::pin(async move { Self::create_now(map, resource) })
	}

	fn get<'a, R>(&'a self, key: &'a ResourceKey) -> StoreFuture<'a, R>
	where
		R: Resource,
	{
		let map = self.0.clone();
		let key = key.clone();

		Box::pin(async move { Self::get_now(map, key) })
	}

	fn update<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource,
	{
		let map = self.0.clone();

		Box::pin(async move { Self::update_now(map, resource) })
	}

	fn update_status<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource,
	{
		let map = self.0.clone();

		Box::pin(async move { Self::update_status_now(map, resource) })
	}

	fn delete<'a, R>(&'a self, key: &'a ResourceKey) -> StoreFuture<'a, Option<R>>
	where
		R: Resource,
	{
		let map = self.0.clone();
		let key = key.clone();

		Box::pin(async move { Self::delete_now(map, key) })
	}

	fn list<'a, R>(
		&'a self,
		namespace: Option<&'a Namespace>,
		selector: &'a LabelSelector,
	) -> StoreFuture<'a, Vec<R>>
	where
		R: Resource,
	{
		let map = self.0.clone();
		let namespace = namespace.cloned();
		let selector = selector.clone();

		Box::pin(async move { Self::list_now(map, namespace, selector) })
	}

	fn revision(&self) -> u64 {
		self.0.read().revision
	}

	fn events_since(&self, revision: u64) -> Vec<StoreEvent> {
		self.0
			.read()
			.events
			.iter()
			.filter(|event| event.revision > revision)
			.cloned()
			.collect()
	}
}
