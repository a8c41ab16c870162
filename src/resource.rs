//! Resource-domain identifiers, metadata, selectors, conditions, and record kinds.

pub mod client;
pub mod condition;
pub mod exporter;
pub mod id;
pub mod lease;
pub mod meta;
pub mod policy;
pub mod secret;
pub mod selector;

pub use client::*;
pub use condition::*;
pub use exporter::*;
pub use id::*;
pub use lease::*;
pub use meta::*;
pub use policy::*;
pub use secret::*;
pub use selector::*;

// self
use crate::_prelude::*;

/// Typed record stored under a `(namespace, name)` key.
///
/// Every record serializes as a `{metadata, spec, status}` document so the store can enforce
/// the spec/status subresource split generically.
pub trait Resource
where
	Self: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static,
{
	/// Stable kind discriminator used for store partitioning and error messages.
	const KIND: &'static str;

	/// Shared metadata view.
	fn metadata(&self) -> &ObjectMeta;

	/// Mutable metadata view.
	fn metadata_mut(&mut self) -> &mut ObjectMeta;

	/// Addressing key derived from metadata.
	fn key(&self) -> ResourceKey {
		ResourceKey::new(self.metadata().namespace.clone(), self.metadata().name.clone())
	}
}
