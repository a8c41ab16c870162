//! Rust’s turnkey hardware-in-the-loop lease broker—matchmake clients onto exporters, drive
//! lease state machines, and rotate bearer credentials in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod admission;
pub mod config;
pub mod error;
pub mod obs;
pub mod policy;
pub mod reconcile;
pub mod resource;
pub mod signer;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		reconcile::{
			client::ClientReconciler, exporter::ExporterReconciler, lease::LeaseReconciler,
		},
		resource::{
			AccessRule, Client, Exporter, ExporterAccessPolicy, ExporterAccessPolicySpec,
			LabelSelector, LeaseSpec, Namespace, ObjectMeta, ResourceKey, ResourceName,
		},
		signer::{CredentialKeeper, Signer, SignerConfig},
		store::MemoryStore,
	};

	/// Bundle of the in-memory store, signer, and reconcilers used across integration tests.
	pub struct TestCluster {
		/// Shared in-memory resource store.
		pub store: Arc<MemoryStore>,
		/// Controller signer backing credential issuance.
		pub signer: Arc<Signer>,
		/// Lease reconciler wired against the store.
		pub leases: LeaseReconciler<MemoryStore>,
		/// Exporter reconciler wired against the store.
		pub exporters: ExporterReconciler<MemoryStore>,
		/// Client reconciler wired against the store.
		pub clients: ClientReconciler<MemoryStore>,
	}

	/// Advertised controller endpoint used by test clusters.
	pub const TEST_ENDPOINT: &str = "broker.test.local:8082";

	/// Builds a signer with a fixed test key.
	pub fn test_signer() -> Arc<Signer> {
		let signer = Signer::new(
			b"test-controller-key-material",
			SignerConfig::new("https://broker.test.local", "broker", "internal:"),
		)
		.expect("Test signing key should be accepted.");

		Arc::new(signer)
	}

	/// Constructs a [`TestCluster`] backed by a fresh [`MemoryStore`] and a fixed signing key.
	pub fn build_test_cluster() -> TestCluster {
		let store = Arc::new(MemoryStore::default());
		let signer = test_signer();
		let keeper = CredentialKeeper::new(signer.clone());
		let leases = LeaseReconciler::new(store.clone());
		let exporters =
			ExporterReconciler::new(store.clone(), keeper.clone(), TEST_ENDPOINT.to_owned());
		let clients = ClientReconciler::new(store.clone(), keeper, TEST_ENDPOINT.to_owned());

		TestCluster { store, signer, leases, exporters, clients }
	}

	/// Namespace shared by test fixtures.
	pub fn test_namespace() -> Namespace {
		Namespace::new("lab").expect("Test namespace should be valid.")
	}

	/// Builds a resource key in the test namespace.
	pub fn test_key(name: &str) -> ResourceKey {
		ResourceKey::new(
			test_namespace(),
			ResourceName::new(name).expect("Test resource name should be valid."),
		)
	}

	/// Builds an equality label selector from key/value pairs.
	pub fn selector(pairs: &[(&str, &str)]) -> LabelSelector {
		let mut out = LabelSelector::default();

		for (key, value) in pairs {
			out.match_labels.insert((*key).to_owned(), (*value).to_owned());
		}

		out
	}

	/// Builds an exporter fixture carrying the provided DUT labels.
	pub fn exporter_fixture(name: &str, labels: &[(&str, &str)]) -> Exporter {
		let mut meta = ObjectMeta::new(
			test_namespace(),
			ResourceName::new(name).expect("Exporter fixture name should be valid."),
		);

		for (key, value) in labels {
			meta.labels.insert((*key).to_owned(), (*value).to_owned());
		}

		Exporter::new(meta)
	}

	/// Builds a client fixture carrying the provided identity labels.
	pub fn client_fixture(name: &str, labels: &[(&str, &str)]) -> Client {
		let mut meta = ObjectMeta::new(
			test_namespace(),
			ResourceName::new(name).expect("Client fixture name should be valid."),
		);

		for (key, value) in labels {
			meta.labels.insert((*key).to_owned(), (*value).to_owned());
		}

		Client::new(meta)
	}

	/// Builds an immediate lease spec for the provided client, selector, and duration.
	pub fn lease_spec(client: &str, pairs: &[(&str, &str)], duration: Duration) -> LeaseSpec {
		LeaseSpec {
			client_ref: ResourceName::new(client).expect("Lease client reference should be valid."),
			selector: selector(pairs),
			begin_time: None,
			end_time: None,
			duration: Some(duration),
			release: false,
		}
	}

	/// Builds a single-rule access policy granting the client selector access to the exporter
	/// selector at the provided priority.
	pub fn policy_fixture(
		name: &str,
		exporter_pairs: &[(&str, &str)],
		client_pairs: &[(&str, &str)],
		priority: i32,
		spot_access: bool,
	) -> ExporterAccessPolicy {
		let meta = ObjectMeta::new(
			test_namespace(),
			ResourceName::new(name).expect("Policy fixture name should be valid."),
		);
		let spec = ExporterAccessPolicySpec {
			exporter_selector: selector(exporter_pairs),
			policies: vec![AccessRule {
				priority,
				from: vec![selector(client_pairs)],
				spot_access,
				window: None,
			}],
		};

		ExporterAccessPolicy::new(meta, spec)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use tokio as _;
