//! Process configuration sourced from the environment.

// self
use crate::{
	_prelude::*,
	resource::{IdentifierError, Namespace},
	signer::SigningKey,
};

/// Advertised controller address handed to clients and exporters.
pub const ENV_GRPC_ENDPOINT: &str = "GRPC_ENDPOINT";
/// Signing key for controller-issued credentials.
pub const ENV_CONTROLLER_KEY: &str = "CONTROLLER_KEY";
/// Signing key shared with router workloads.
pub const ENV_ROUTER_KEY: &str = "ROUTER_KEY";
/// Namespace the process reconciles in; cluster-wide when unset.
pub const ENV_NAMESPACE: &str = "NAMESPACE";

/// Configuration and validation failures raised at startup.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required environment variable is unset.
	#[error("Environment variable {name} is not set.")]
	MissingVariable {
		/// Variable name.
		name: &'static str,
	},
	/// A required environment variable is set but empty.
	#[error("Environment variable {name} is empty.")]
	EmptyVariable {
		/// Variable name.
		name: &'static str,
	},
	/// The configured namespace is not a valid identifier.
	#[error("Environment variable {name} does not hold a valid namespace.")]
	InvalidNamespace {
		/// Variable name.
		name: &'static str,
		/// Underlying validation failure.
		#[source]
		source: IdentifierError,
	},
}

/// Process-wide broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Advertised controller address.
	pub endpoint: String,
	/// Key material minting controller credentials.
	pub controller_key: SigningKey,
	/// Key material shared with router workloads.
	pub router_key: SigningKey,
	/// Namespace bound for reconciliation; `None` reconciles cluster-wide.
	pub namespace: Option<Namespace>,
}
impl BrokerConfig {
	/// Reads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds configuration from explicit parts, bypassing the environment.
	pub fn new(
		endpoint: impl Into<String>,
		controller_key: SigningKey,
		router_key: SigningKey,
		namespace: Option<Namespace>,
	) -> Self {
		Self { endpoint: endpoint.into(), controller_key, router_key, namespace }
	}

	fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
		let endpoint = required(&lookup, ENV_GRPC_ENDPOINT)?;
		let controller_key = SigningKey::new(required(&lookup, ENV_CONTROLLER_KEY)?);
		let router_key = SigningKey::new(required(&lookup, ENV_ROUTER_KEY)?);
		let namespace = match lookup(ENV_NAMESPACE) {
			None => None,
			Some(value) if value.is_empty() => None,
			Some(value) => Some(Namespace::new(value).map_err(|source| {
				ConfigError::InvalidNamespace { name: ENV_NAMESPACE, source }
			})?),
		};

		Ok(Self { endpoint, controller_key, router_key, namespace })
	}
}

fn required(
	lookup: &impl Fn(&'static str) -> Option<String>,
	name: &'static str,
) -> Result<String, ConfigError> {
	match lookup(name) {
		None => Err(ConfigError::MissingVariable { name }),
		Some(value) if value.is_empty() => Err(ConfigError::EmptyVariable { name }),
		Some(value) => Ok(value),
	}
}
