//! Credential keeping: every identity's secret holds a token that passes validation.

// self
use crate::{
	_prelude::*,
	resource::{Namespace, ObjectMeta, OwnerReference, ResourceKey, ResourceName, Secret, SecretRef},
	signer::Signer,
	store::{ResourceStore, StoreError},
};

/// Fixed name of the orphaned secret holding the controller signing key.
pub const CONTROLLER_WORKLOAD_SECRET: &str = "hil-controller-secret";
/// Fixed name of the orphaned secret holding the router signing key.
pub const ROUTER_WORKLOAD_SECRET: &str = "hil-router-secret";
/// Annotation recording which signing key minted the secret's token.
pub const KEY_FINGERPRINT_ANNOTATION: &str = "hil-broker.dev/key-fingerprint";

/// Ensures identity secrets exist and hold tokens that pass the signer's validation.
///
/// Rotation patches the token field in place so the secret's identity is preserved and
/// existing credential references remain valid.
#[derive(Clone, Debug)]
pub struct CredentialKeeper {
	signer: Arc<Signer>,
}
impl CredentialKeeper {
	/// Creates a keeper around the provided signer.
	pub fn new(signer: Arc<Signer>) -> Self {
		Self { signer }
	}

	/// The signer backing this keeper.
	pub fn signer(&self) -> &Signer {
		&self.signer
	}

	/// Ensures the secret under `key` holds a valid token bound to `subject`.
	///
	/// A missing secret is created: owned by `owner` when provided, orphaned otherwise so
	/// recreating the parent record does not rotate its credential. A present secret with a
	/// missing, corrupt, or foreign token gets a fresh token patched in.
	pub async fn ensure_secret<S>(
		&self,
		store: &S,
		key: &ResourceKey,
		subject: &str,
		owner: Option<OwnerReference>,
	) -> Result<SecretRef>
	where
		S: ResourceStore,
	{
		match store.get::<Secret>(key).await {
			Ok(mut secret) => {
				let valid = secret
					.token()
					.is_some_and(|token| self.signer.validate_for_subject(&token, subject).is_ok());

				if !valid {
					secret.set_token(&self.signer.token(subject)?);
					secret.metadata.annotations.insert(
						KEY_FINGERPRINT_ANNOTATION.to_owned(),
						self.signer.key_fingerprint().to_owned(),
					);
					store.update(secret).await?;
				}

				Ok(SecretRef::new(key.name.clone()))
			},
			Err(StoreError::NotFound { .. }) => {
				let mut meta = ObjectMeta::new(key.namespace.clone(), key.name.clone());

				meta = match owner {
					Some(owner) => meta.with_owner(owner),
					None => meta.with_orphan_annotation(),
				};

				meta.annotations.insert(
					KEY_FINGERPRINT_ANNOTATION.to_owned(),
					self.signer.key_fingerprint().to_owned(),
				);

				let mut secret = Secret::new(meta);

				secret.set_token(&self.signer.token(subject)?);
				store.create(secret).await?;

				Ok(SecretRef::new(key.name.clone()))
			},
			Err(err) => Err(err.into()),
		}
	}

	/// Ensures a fixed-name workload secret holding raw signing-key material.
	///
	/// Workload secrets are orphaned and never rotated here: replacing the key would
	/// invalidate every in-flight token minted with it.
	pub async fn ensure_workload_secret<S>(
		&self,
		store: &S,
		namespace: &Namespace,
		name: &str,
		key_material: &[u8],
	) -> Result<SecretRef>
	where
		S: ResourceStore,
	{
		let name = ResourceName::new(name)?;
		let key = ResourceKey::new(namespace.clone(), name.clone());

		match store.get::<Secret>(&key).await {
			Ok(_) => Ok(SecretRef::new(name)),
			Err(StoreError::NotFound { .. }) => {
				let meta = ObjectMeta::new(key.namespace, key.name).with_orphan_annotation();
				let mut secret = Secret::new(meta);

				secret.set_field(crate::resource::KEY_FIELD, key_material);
				store.create(secret).await?;

				Ok(SecretRef::new(name))
			},
			Err(err) => Err(err.into()),
		}
	}
}
