//! Process-wide credential signer minting and validating subject-bound bearer tokens.

pub mod keeper;

pub use keeper::CredentialKeeper;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
	errors::Error as JwtError,
};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Raw signing-key material wrapper keeping sensitive bytes out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);
impl SigningKey {
	/// Wraps new key material.
	pub fn new(value: impl Into<Vec<u8>>) -> Self {
		Self(value.into())
	}

	/// Returns the inner key bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}

	/// Returns `true` when no key material is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningKey").field(&"<redacted>").finish()
	}
}
impl Display for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Issuer, audience, and subject-prefix configuration applied to every token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerConfig {
	/// `iss` claim stamped onto minted tokens and required during validation.
	pub issuer: String,
	/// `aud` claim stamped onto minted tokens and required during validation.
	pub audience: String,
	/// Prefix concatenated with the subject's internal identity to form `sub`.
	pub subject_prefix: String,
}
impl SignerConfig {
	/// Creates a config from its parts.
	pub fn new(
		issuer: impl Into<String>,
		audience: impl Into<String>,
		subject_prefix: impl Into<String>,
	) -> Self {
		Self {
			issuer: issuer.into(),
			audience: audience.into(),
			subject_prefix: subject_prefix.into(),
		}
	}
}

/// Claims carried by broker-issued tokens.
///
/// There is no `exp`: tokens live with the resource they authenticate and are rotated by
/// replacing the secret's token field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// Issuing authority.
	pub iss: String,
	/// Prefixed internal identity of the subject resource.
	pub sub: String,
	/// Intended audience.
	pub aud: String,
	/// Issued-at, seconds since the epoch.
	pub iat: i64,
	/// Not-before, seconds since the epoch.
	pub nbf: i64,
	/// Random token identifier.
	pub jti: String,
}

/// Error type produced by the [`Signer`].
#[derive(Debug, ThisError)]
pub enum SignerError {
	/// The configured signing key is empty.
	#[error("Signing key must not be empty.")]
	EmptyKey,
	/// Token could not be minted.
	#[error("Unable to mint a token.")]
	Mint {
		/// Underlying JWT failure.
		#[source]
		source: JwtError,
	},
	/// Token failed signature, issuer, audience, or algorithm checks.
	#[error("Token failed verification.")]
	Verification {
		/// Underlying JWT failure.
		#[source]
		source: JwtError,
	},
	/// Token verified but is bound to a different subject.
	#[error("Token subject does not match {expected}.")]
	SubjectMismatch {
		/// Subject claim the caller required.
		expected: String,
	},
}

/// Process-wide signer holding one symmetric key.
///
/// Minting uses HS256; validation additionally accepts HS384/HS512 so key-compatible
/// peers can issue with a stronger digest.
#[derive(Clone)]
pub struct Signer {
	config: SignerConfig,
	encoding: EncodingKey,
	decoding: DecodingKey,
	validation: Validation,
	fingerprint: String,
}
impl Signer {
	/// Creates a signer from raw key material and claim configuration.
	pub fn new(key: &[u8], config: SignerConfig) -> Result<Self, SignerError> {
		if key.is_empty() {
			return Err(SignerError::EmptyKey);
		}

		let mut validation = Validation::new(Algorithm::HS256);

		validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
		validation.set_required_spec_claims(&["sub", "nbf"]);
		validation.set_issuer(&[&config.issuer]);
		validation.set_audience(&[&config.audience]);
		validation.validate_exp = false;
		validation.validate_nbf = true;

		Ok(Self {
			encoding: EncodingKey::from_secret(key),
			decoding: DecodingKey::from_secret(key),
			validation,
			fingerprint: compute_fingerprint(key),
			config,
		})
	}

	/// Claim configuration in effect.
	pub fn config(&self) -> &SignerConfig {
		&self.config
	}

	/// Stable fingerprint of the signing key, safe to log and annotate.
	pub fn key_fingerprint(&self) -> &str {
		&self.fingerprint
	}

	/// `sub` claim value for the provided internal identity.
	pub fn subject_claim(&self, subject: &str) -> String {
		format!("{}{subject}", self.config.subject_prefix)
	}

	/// Mints a token bound to the provided internal identity, stamped with the current clock.
	pub fn token(&self, subject: &str) -> Result<String, SignerError> {
		self.token_at(subject, OffsetDateTime::now_utc())
	}

	/// Mints a token with an explicit issue instant.
	pub fn token_at(&self, subject: &str, now: OffsetDateTime) -> Result<String, SignerError> {
		let claims = Claims {
			iss: self.config.issuer.clone(),
			sub: self.subject_claim(subject),
			aud: self.config.audience.clone(),
			iat: now.unix_timestamp(),
			nbf: now.unix_timestamp(),
			jti: format!("{:032x}", rand::rng().random::<u128>()),
		};

		encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
			.map_err(|source| SignerError::Mint { source })
	}

	/// Verifies signature, issuer, audience, and allowed algorithms; returns the claims.
	pub fn validate(&self, token: &str) -> Result<Claims, SignerError> {
		decode::<Claims>(token, &self.decoding, &self.validation)
			.map(|data| data.claims)
			.map_err(|source| SignerError::Verification { source })
	}

	/// Validates the token and additionally pins its subject claim.
	pub fn validate_for_subject(&self, token: &str, subject: &str) -> Result<Claims, SignerError> {
		let claims = self.validate(token)?;
		let expected = self.subject_claim(subject);

		if claims.sub != expected {
			return Err(SignerError::SubjectMismatch { expected });
		}

		Ok(claims)
	}
}
impl Debug for Signer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Signer")
			.field("config", &self.config)
			.field("key", &"<redacted>")
			.field("fingerprint", &self.fingerprint)
			.finish()
	}
}

fn compute_fingerprint(key: &[u8]) -> String {
	let mut hasher = Sha256::new();

	hasher.update(key);

	let digest = hasher.finalize();

	STANDARD_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn signer() -> Signer {
		Signer::new(b"unit-test-key", SignerConfig::new("https://broker.local", "broker", "internal:"))
			.expect("Signer fixture should build.")
	}

	#[test]
	fn empty_keys_are_rejected() {
		assert!(matches!(
			Signer::new(b"", SignerConfig::new("iss", "aud", "p:")),
			Err(SignerError::EmptyKey)
		));
	}

	#[test]
	fn issue_then_validate_round_trips_the_subject() {
		let signer = signer();
		let token = signer.token("exporter:lab:e-1").expect("Token should mint.");
		let claims = signer
			.validate_for_subject(&token, "exporter:lab:e-1")
			.expect("Minted token should validate for its subject.");

		assert_eq!(claims.sub, "internal:exporter:lab:e-1");
		assert_eq!(claims.iss, "https://broker.local");
		assert_eq!(claims.aud, "broker");
	}

	#[test]
	fn subject_binding_is_enforced() {
		let signer = signer();
		let token = signer.token("exporter:lab:e-1").expect("Token should mint.");

		assert!(matches!(
			signer.validate_for_subject(&token, "exporter:lab:e-2"),
			Err(SignerError::SubjectMismatch { .. })
		));
	}

	#[test]
	fn foreign_and_garbage_tokens_fail() {
		let signer = signer();
		let foreign =
			Signer::new(b"some-other-key", SignerConfig::new("https://broker.local", "broker", "internal:"))
				.expect("Foreign signer fixture should build.");
		let token = foreign.token("client:lab:c-1").expect("Foreign token should mint.");

		assert!(matches!(signer.validate(&token), Err(SignerError::Verification { .. })));
		assert!(matches!(signer.validate("not-a-jwt"), Err(SignerError::Verification { .. })));
	}

	#[test]
	fn issuer_and_audience_are_pinned() {
		let signer = signer();
		let wrong_issuer =
			Signer::new(b"unit-test-key", SignerConfig::new("https://other.local", "broker", "internal:"))
				.expect("Issuer variant fixture should build.");
		let wrong_audience =
			Signer::new(b"unit-test-key", SignerConfig::new("https://broker.local", "router", "internal:"))
				.expect("Audience variant fixture should build.");

		for foreign in [wrong_issuer, wrong_audience] {
			let token = foreign.token("client:lab:c-1").expect("Variant token should mint.");

			assert!(matches!(signer.validate(&token), Err(SignerError::Verification { .. })));
		}
	}

	#[test]
	fn fingerprints_are_stable_per_key() {
		let a = signer();
		let b = signer();
		let c = Signer::new(b"different-key", SignerConfig::new("iss", "aud", "p:"))
			.expect("Alternate signer fixture should build.");

		assert_eq!(a.key_fingerprint(), b.key_fingerprint());
		assert_ne!(a.key_fingerprint(), c.key_fingerprint());
	}

	#[test]
	fn key_material_redacts() {
		let key = SigningKey::new(b"sensitive".to_vec());

		assert_eq!(format!("{key:?}"), "SigningKey(\"<redacted>\")");
		assert_eq!(format!("{key}"), "<redacted>");
	}
}
