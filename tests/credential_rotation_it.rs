// std
use std::sync::Arc;
// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use hil_broker::{
	admission::{self, HeartbeatReport},
	reconcile::{client::ClientReconciler, exporter::ExporterReconciler},
	resource::{
		Client, ConditionType, Device, Exporter, LabelSelector, Lease, LeaseSpec, Namespace,
		ONLINE_REEVALUATE_INTERVAL, ObjectMeta, ResourceKey, ResourceName, Secret,
		condition::reason, find_condition,
	},
	signer::{CredentialKeeper, Signer, SignerConfig},
	store::{MemoryStore, ResourceStore, StoreError},
};

const ENDPOINT: &str = "broker.test.local:8082";

fn t0() -> OffsetDateTime {
	macros::datetime!(2026-03-01 10:00 UTC)
}

fn namespace() -> Namespace {
	Namespace::new("lab").expect("Namespace fixture should be valid.")
}

fn name(value: &str) -> ResourceName {
	ResourceName::new(value).expect("Name fixture should be valid.")
}

fn key(value: &str) -> ResourceKey {
	ResourceKey::new(namespace(), name(value))
}

fn signer() -> Arc<Signer> {
	Arc::new(
		Signer::new(
			b"integration-test-key",
			SignerConfig::new("https://broker.test.local", "broker", "internal:"),
		)
		.expect("Signer fixture should build."),
	)
}

fn exporters(store: &Arc<MemoryStore>) -> ExporterReconciler<MemoryStore> {
	ExporterReconciler::new(store.clone(), CredentialKeeper::new(signer()), ENDPOINT.to_owned())
}

fn clients(store: &Arc<MemoryStore>) -> ClientReconciler<MemoryStore> {
	ClientReconciler::new(store.clone(), CredentialKeeper::new(signer()), ENDPOINT.to_owned())
}

fn exporter(value: &str) -> Exporter {
	let mut meta = ObjectMeta::new(namespace(), name(value));

	meta.labels.insert("dut".to_owned(), "a".to_owned());

	Exporter::new(meta)
}

#[tokio::test]
async fn corrupted_exporter_tokens_rotate_in_place() {
	let store = Arc::new(MemoryStore::default());
	let exporters = exporters(&store);

	store.create(exporter("e-1")).await.expect("Exporter fixture should persist.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Initial exporter reconciliation should succeed.");

	let reconciled =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");
	let credential =
		reconciled.status.credential.clone().expect("A credential reference should be set.");

	assert_eq!(credential.name.as_ref(), "e-1-credential");
	assert_eq!(reconciled.status.endpoint.as_deref(), Some(ENDPOINT));

	// Overwrite the stored token with garbage.
	let mut secret = store
		.get::<Secret>(&key("e-1-credential"))
		.await
		.expect("Credential secret should exist.");

	secret.set_token("garbage");
	store.update(secret).await.expect("Corrupting the token should commit.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Rotation reconciliation should succeed.");

	let after =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert_eq!(
		after.status.credential,
		Some(credential),
		"The credential reference is unchanged by rotation."
	);

	let rotated = store
		.get::<Secret>(&key("e-1-credential"))
		.await
		.expect("Rotated secret should keep its identity.");
	let token = rotated.token().expect("Rotated secret should carry a token.");

	signer()
		.validate_for_subject(&token, "exporter:lab:e-1")
		.expect("The rotated token should verify for the exporter's identity.");
}

#[tokio::test]
async fn exporter_credentials_survive_deletion_but_client_credentials_do_not() {
	let store = Arc::new(MemoryStore::default());
	let exporters = exporters(&store);
	let clients = clients(&store);

	store.create(exporter("e-1")).await.expect("Exporter fixture should persist.");
	store
		.create(Client::new(ObjectMeta::new(namespace(), name("c-1"))))
		.await
		.expect("Client fixture should persist.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Exporter reconciliation should succeed.");
	clients.reconcile(&key("c-1")).await.expect("Client reconciliation should succeed.");

	let client =
		store.get::<Client>(&key("c-1")).await.expect("Client should be fetchable.");

	assert_eq!(
		client.status.credential.as_ref().map(|credential| credential.name.as_ref()),
		Some("c-1-credential")
	);
	assert_eq!(client.status.endpoint.as_deref(), Some(ENDPOINT));

	store
		.delete::<Client>(&key("c-1"))
		.await
		.expect("Deleting the client should succeed.");

	assert!(
		matches!(
			store.get::<Secret>(&key("c-1-credential")).await,
			Err(StoreError::NotFound { .. })
		),
		"Client credentials are owned and garbage-collected with the client."
	);

	store
		.delete::<Exporter>(&key("e-1"))
		.await
		.expect("Deleting the exporter should succeed.");
	store
		.get::<Secret>(&key("e-1-credential"))
		.await
		.expect("Exporter credentials are orphaned and survive deletion.");
}

#[tokio::test]
async fn online_tracking_follows_heartbeats_and_self_reports() {
	let store = Arc::new(MemoryStore::default());
	let exporters = exporters(&store);

	store.create(exporter("e-1")).await.expect("Exporter fixture should persist.");

	let action = exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Never-seen reconciliation should succeed.");

	assert_eq!(action.requeue_after(), None, "Offline exporters wait for heartbeat events.");

	let never_seen =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");
	let online = find_condition(&never_seen.status.conditions, ConditionType::Online)
		.expect("Online condition should be recorded.");

	assert!(!online.status);
	assert_eq!(online.reason, reason::SEEN);
	assert_eq!(online.message, "Never seen");

	admission::record_heartbeat(&*store, &key("e-1"), HeartbeatReport::alive(), t0())
		.await
		.expect("Heartbeat should commit.");

	let action = exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Fresh reconciliation should succeed.");

	assert_eq!(
		action.requeue_after(),
		Some(ONLINE_REEVALUATE_INTERVAL),
		"Online exporters re-check staleness on a timer."
	);

	let fresh =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert!(
		find_condition(&fresh.status.conditions, ConditionType::Online)
			.is_some_and(|condition| condition.status)
	);

	let late = t0() + Duration::minutes(2);

	exporters
		.reconcile_at(&key("e-1"), late)
		.await
		.expect("Stale reconciliation should succeed.");

	let stale =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");
	let online = find_condition(&stale.status.conditions, ConditionType::Online)
		.expect("Online condition should be recorded.");

	assert!(!online.status);
	assert_eq!(online.message, "Last seen more than 1 minute ago");

	admission::record_heartbeat(&*store, &key("e-1"), HeartbeatReport::shutdown("draining"), late)
		.await
		.expect("Shutdown report should commit.");
	exporters
		.reconcile_at(&key("e-1"), late)
		.await
		.expect("Shutdown reconciliation should succeed.");

	let draining =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");
	let online = find_condition(&draining.status.conditions, ConditionType::Online)
		.expect("Online condition should be recorded.");

	assert!(!online.status, "A graceful shutdown overrides fresh heartbeats.");
	assert_eq!(online.reason, reason::OFFLINE);
	assert_eq!(online.message, "draining");
}

#[tokio::test]
async fn registration_follows_reported_device_lists() {
	let store = Arc::new(MemoryStore::default());
	let exporters = exporters(&store);

	store.create(exporter("e-1")).await.expect("Exporter fixture should persist.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Unregistered reconciliation should succeed.");

	let unregistered =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert!(
		find_condition(&unregistered.status.conditions, ConditionType::Registered)
			.is_some_and(|condition| !condition.status)
	);

	let devices = vec![Device {
		uuid: "d-1".into(),
		parent_uuid: None,
		labels: Default::default(),
	}];

	admission::record_heartbeat(
		&*store,
		&key("e-1"),
		HeartbeatReport::registration(devices),
		t0(),
	)
	.await
	.expect("Registration should commit.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Registered reconciliation should succeed.");

	let registered =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert!(
		find_condition(&registered.status.conditions, ConditionType::Registered)
			.is_some_and(|condition| condition.status)
	);
}

#[tokio::test]
async fn lease_back_pointers_are_adopted_and_dropped_by_query() {
	let store = Arc::new(MemoryStore::default());
	let exporters = exporters(&store);

	store.create(exporter("e-1")).await.expect("Exporter fixture should persist.");
	admission::record_heartbeat(&*store, &key("e-1"), HeartbeatReport::alive(), t0())
		.await
		.expect("Heartbeat should commit.");

	// An active lease that claimed the exporter, but whose back-pointer write was lost.
	let mut lease = Lease::new(
		ObjectMeta::new(namespace(), name("l-1")),
		LeaseSpec {
			client_ref: name("c-1"),
			selector: LabelSelector::matching([("dut", "a")]),
			begin_time: None,
			end_time: None,
			duration: Some(Duration::minutes(5)),
			release: false,
		},
	);

	lease.status.exporter_ref = Some(name("e-1"));
	lease.status.begin_time = Some(t0());
	store.create(lease).await.expect("Active lease fixture should persist.");
	exporters
		.reconcile_at(&key("e-1"), t0())
		.await
		.expect("Adoption reconciliation should succeed.");

	let adopted =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert_eq!(
		adopted.status.lease_ref,
		Some(name("l-1")),
		"The back edge is derived by query, tolerating a lost write."
	);

	// Once the lease ends (label stamped), the back-pointer drops.
	let mut ended = store.get::<Lease>(&key("l-1")).await.expect("Lease should be fetchable.");

	ended.status.ended = true;
	ended.status.end_time = Some(t0() + Duration::seconds(30));

	let mut ended = store.update_status(ended).await.expect("Terminal status should commit.");

	ended.mark_ended_label();
	store.update(ended).await.expect("The ended label should commit.");
	exporters
		.reconcile_at(&key("e-1"), t0() + Duration::seconds(30))
		.await
		.expect("Drop reconciliation should succeed.");

	let dropped =
		store.get::<Exporter>(&key("e-1")).await.expect("Exporter should be fetchable.");

	assert_eq!(dropped.status.lease_ref, None);
}
