//! Broker-level error types shared across reconcilers, the signer, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure, including optimistic-concurrency conflicts.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Credential signer failure.
	#[error(transparent)]
	Signer(#[from] crate::signer::SignerError),
	/// User-supplied lease input failed validation.
	#[error(transparent)]
	Validation(#[from] crate::resource::LeaseValidationError),
	/// Identifier validation failure.
	#[error(transparent)]
	Identifier(#[from] crate::resource::IdentifierError),
	/// Local process configuration problem.
	#[error(transparent)]
	Config(#[from] crate::config::ConfigError),

	/// Request is valid in isolation but conflicts with the resource's current state.
	#[error("Failed precondition: {reason}.")]
	FailedPrecondition {
		/// Broker-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the error is an optimistic-concurrency conflict that should be
	/// retried rather than surfaced.
	pub fn is_conflict(&self) -> bool {
		matches!(self, Self::Storage(crate::store::StoreError::Conflict { .. }))
	}

	/// Returns `true` when the error reports a missing resource.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::Storage(crate::store::StoreError::NotFound { .. }))
	}
}
