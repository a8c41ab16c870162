//! Storage contract and built-in store implementation for broker resource records.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	resource::{LabelSelector, Namespace, Resource, ResourceKey},
};

/// Future type returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backing-store contract the reconcilers run against.
///
/// Records are addressed by `(kind, namespace, name)`. Writes carry the `resource_version`
/// observed at read time; a mismatch fails with [`StoreError::Conflict`] and exactly one of
/// two racing writers commits. Spec and status are separate subresources: [`update`](Self::update)
/// can never alter status and [`update_status`](Self::update_status) can never alter spec.
pub trait ResourceStore
where
	Self: Send + Sync,
{
	/// Persists a new record, assigning its first `resource_version` and generation.
	fn create<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource;

	/// Fetches the record under the provided key.
	fn get<'a, R>(&'a self, key: &'a ResourceKey) -> StoreFuture<'a, R>
	where
		R: Resource;

	/// Replaces metadata + spec, preserving status; bumps the generation iff the spec changed.
	fn update<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource;

	/// Replaces status only, preserving metadata + spec.
	fn update_status<R>(&self, resource: R) -> StoreFuture<'_, R>
	where
		R: Resource;

	/// Removes the record, cascading to records owned by it unless they are orphaned.
	fn delete<'a, R>(&'a self, key: &'a ResourceKey) -> StoreFuture<'a, Option<R>>
	where
		R: Resource;

	/// Lists records of one kind, optionally bounded to a namespace, matching the selector
	/// against metadata labels. Results are ordered by name.
	fn list<'a, R>(
		&'a self,
		namespace: Option<&'a Namespace>,
		selector: &'a LabelSelector,
	) -> StoreFuture<'a, Vec<R>>
	where
		R: Resource;

	/// Revision of the most recent commit.
	fn revision(&self) -> u64;

	/// Events committed after the provided revision, oldest first.
	fn events_since(&self, revision: u64) -> Vec<StoreEvent>;

	/// Returns a cursor over future events, starting at the current revision.
	fn watcher(&self) -> Watcher<'_, Self>
	where
		Self: Sized,
	{
		Watcher { store: self, cursor: self.revision() }
	}
}

/// Change kinds delivered on the event feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
	/// Record was created.
	Created,
	/// Record spec or status was written.
	Updated,
	/// Record was removed.
	Deleted,
}

/// One committed change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEvent {
	/// Monotone commit revision.
	pub revision: u64,
	/// Kind of the affected record.
	pub kind: &'static str,
	/// Key of the affected record.
	pub key: ResourceKey,
	/// Change kind.
	pub action: EventAction,
}

/// Cursor over the store's event feed.
#[derive(Debug)]
pub struct Watcher<'a, S>
where
	S: ResourceStore,
{
	store: &'a S,
	cursor: u64,
}
impl<S> Watcher<'_, S>
where
	S: ResourceStore,
{
	/// Drains events committed since the last poll.
	pub fn poll(&mut self) -> Vec<StoreEvent> {
		let events = self.store.events_since(self.cursor);

		if let Some(last) = events.last() {
			self.cursor = last.revision;
		}

		events
	}
}

/// Error type produced by [`ResourceStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// The write carried a stale `resource_version`.
	#[error("Conflict writing {kind} {key}: resource version is stale.")]
	Conflict {
		/// Kind of the contended record.
		kind: &'static str,
		/// Key of the contended record.
		key: String,
	},
	/// No record exists under the key.
	#[error("{kind} {key} was not found.")]
	NotFound {
		/// Kind of the missing record.
		kind: &'static str,
		/// Key of the missing record.
		key: String,
	},
	/// A record already exists under the key.
	#[error("{kind} {key} already exists.")]
	AlreadyExists {
		/// Kind of the existing record.
		kind: &'static str,
		/// Key of the existing record.
		key: String,
	},
	/// Record payload could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload, including the offending path.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
