//! Label selector matching: equality pairs plus set-membership expressions.

// self
use crate::_prelude::*;

/// Set-membership operator applied by a [`SelectorRequirement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
	/// The label value must be one of the listed values.
	In,
	/// The label value must not be any of the listed values (absent labels match).
	NotIn,
	/// The label key must be present, regardless of value.
	Exists,
	/// The label key must be absent.
	DoesNotExist,
}

/// One set-membership expression within a [`LabelSelector`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRequirement {
	/// Label key the requirement applies to.
	pub key: String,
	/// Membership operator.
	pub operator: SelectorOperator,
	/// Candidate values for `In`/`NotIn`; ignored by the existence operators.
	#[serde(default)]
	pub values: Vec<String>,
}
impl SelectorRequirement {
	/// Builds an `In`/`NotIn` requirement over the provided values.
	pub fn values<I, S>(key: impl Into<String>, operator: SelectorOperator, values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { key: key.into(), operator, values: values.into_iter().map(Into::into).collect() }
	}

	/// Builds an existence requirement.
	pub fn exists(key: impl Into<String>, present: bool) -> Self {
		Self {
			key: key.into(),
			operator: if present {
				SelectorOperator::Exists
			} else {
				SelectorOperator::DoesNotExist
			},
			values: Vec::new(),
		}
	}

	fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		let value = labels.get(&self.key);

		match self.operator {
			SelectorOperator::In =>
				value.is_some_and(|value| self.values.iter().any(|candidate| candidate == value)),
			SelectorOperator::NotIn =>
				value.is_none_or(|value| !self.values.iter().any(|candidate| candidate == value)),
			SelectorOperator::Exists => value.is_some(),
			SelectorOperator::DoesNotExist => value.is_none(),
		}
	}
}

/// Label match a record must satisfy: every equality pair and every requirement must hold.
///
/// An empty selector matches everything; lease admission treats that as invalid input, so
/// [`is_empty`](Self::is_empty) is checked before matchmaking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
	/// Exact key/value matches.
	#[serde(default)]
	pub match_labels: BTreeMap<String, String>,
	/// Set-membership expressions.
	#[serde(default)]
	pub match_expressions: Vec<SelectorRequirement>,
}
impl LabelSelector {
	/// Builds an equality selector from key/value pairs.
	pub fn matching<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			match_labels: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
			match_expressions: Vec::new(),
		}
	}

	/// Adds a requirement to the selector.
	pub fn with_requirement(mut self, requirement: SelectorRequirement) -> Self {
		self.match_expressions.push(requirement);

		self
	}

	/// Returns `true` when the selector carries no constraints at all.
	pub fn is_empty(&self) -> bool {
		self.match_labels.is_empty() && self.match_expressions.is_empty()
	}

	/// Evaluates the selector against a label map.
	pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		for (key, expected) in &self.match_labels {
			if labels.get(key) != Some(expected) {
				return false;
			}
		}

		self.match_expressions.iter().all(|requirement| requirement.matches(labels))
	}
}
