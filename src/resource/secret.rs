//! Opaque secret records holding bearer tokens and workload signing keys.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	resource::{ObjectMeta, Resource, ResourceName},
};

/// Payload field carrying a bearer token.
pub const TOKEN_FIELD: &str = "token";
/// Payload field carrying raw signing-key material.
pub const KEY_FIELD: &str = "key";

/// Reference from a record's status to the secret holding its credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
	/// Secret name; the namespace is implied to match the referencing record.
	pub name: ResourceName,
}
impl SecretRef {
	/// Builds a reference to the named secret.
	pub fn new(name: ResourceName) -> Self {
		Self { name }
	}
}

/// Secret payload: field name to base64-encoded bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretData {
	/// Base64-encoded values keyed by field name.
	#[serde(default)]
	pub data: BTreeMap<String, String>,
}

/// Secrets carry no reconciler-owned state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStatus {}

/// Opaque key/value record, garbage-collected with its owner unless orphaned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
	/// Shared record metadata.
	pub metadata: ObjectMeta,
	/// Base64-encoded payload.
	#[serde(default)]
	pub spec: SecretData,
	/// Empty status placeholder.
	#[serde(default)]
	pub status: SecretStatus,
}
impl Secret {
	/// Creates an empty secret from metadata.
	pub fn new(metadata: ObjectMeta) -> Self {
		Self { metadata, spec: SecretData::default(), status: SecretStatus::default() }
	}

	/// Stores a field, base64-encoding the value.
	pub fn set_field(&mut self, field: impl Into<String>, value: &[u8]) {
		self.spec.data.insert(field.into(), STANDARD.encode(value));
	}

	/// Reads and decodes a field; `None` when absent or not valid base64.
	pub fn field(&self, field: &str) -> Option<Vec<u8>> {
		self.spec.data.get(field).and_then(|encoded| STANDARD.decode(encoded).ok())
	}

	/// Stores the bearer token field.
	pub fn set_token(&mut self, token: &str) {
		self.set_field(TOKEN_FIELD, token.as_bytes());
	}

	/// Reads the bearer token field as UTF-8.
	pub fn token(&self) -> Option<String> {
		self.field(TOKEN_FIELD).and_then(|bytes| String::from_utf8(bytes).ok())
	}
}
impl Resource for Secret {
	const KIND: &'static str = "Secret";

	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}

	fn metadata_mut(&mut self) -> &mut ObjectMeta {
		&mut self.metadata
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::resource::Namespace;

	fn secret() -> Secret {
		Secret::new(ObjectMeta::new(
			Namespace::new("lab").expect("Namespace fixture should be valid."),
			ResourceName::new("exporter-1-credential")
				.expect("Secret name fixture should be valid."),
		))
	}

	#[test]
	fn token_field_round_trips() {
		let mut secret = secret();

		assert_eq!(secret.token(), None);

		secret.set_token("bearer-token");

		assert_eq!(secret.token().as_deref(), Some("bearer-token"));
		assert_ne!(
			secret.spec.data.get(TOKEN_FIELD).map(String::as_str),
			Some("bearer-token"),
			"Stored payloads are base64-encoded."
		);
	}

	#[test]
	fn garbage_payloads_read_as_absent() {
		let mut secret = secret();

		secret.spec.data.insert(TOKEN_FIELD.to_owned(), "not base64!!!".to_owned());

		assert_eq!(secret.token(), None);
	}
}
