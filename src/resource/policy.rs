//! Exporter access policy records: who may lease which exporters, and how preferentially.

// self
use crate::{
	_prelude::*,
	resource::{LabelSelector, ObjectMeta, Resource},
};

/// Recurring UTC time-of-day window during which a rule applies.
///
/// A window wrapping midnight (`start > end`) covers the two partial intervals on either
/// side of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
	/// Inclusive window start.
	pub start: time::Time,
	/// Exclusive window end.
	pub end: time::Time,
}
impl TimeWindow {
	/// Returns `true` when the instant's UTC time of day falls inside the window.
	pub fn contains(&self, instant: OffsetDateTime) -> bool {
		let at = instant.time();

		if self.start <= self.end { self.start <= at && at < self.end } else { at >= self.start || at < self.end }
	}
}

/// One ordered rule within an access policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
	/// Scheduling priority; higher wins during candidate ordering.
	pub priority: i32,
	/// Client selectors the rule grants access to; any match suffices.
	pub from: Vec<LabelSelector>,
	/// Marks the grant as spot access: lowest preference, chosen only when no dedicated
	/// grant applies.
	#[serde(default)]
	pub spot_access: bool,
	/// Optional recurring window outside of which the rule is dormant.
	#[serde(default)]
	pub window: Option<TimeWindow>,
}
impl AccessRule {
	/// Returns `true` when the rule applies to the client labels at the provided instant.
	pub fn applies_to(&self, client_labels: &BTreeMap<String, String>, now: OffsetDateTime) -> bool {
		if self.window.is_some_and(|window| !window.contains(now)) {
			return false;
		}

		self.from.iter().any(|selector| selector.matches(client_labels))
	}
}

/// Administrator-supplied policy spec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterAccessPolicySpec {
	/// Exporters the policy governs.
	pub exporter_selector: LabelSelector,
	/// Ordered access rules.
	pub policies: Vec<AccessRule>,
}

/// Policies carry no reconciler-owned state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterAccessPolicyStatus {}

/// Authorization record intersecting client identity with exporter labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterAccessPolicy {
	/// Shared record metadata.
	pub metadata: ObjectMeta,
	/// Administrator-supplied spec.
	pub spec: ExporterAccessPolicySpec,
	/// Empty status placeholder.
	#[serde(default)]
	pub status: ExporterAccessPolicyStatus,
}
impl ExporterAccessPolicy {
	/// Creates a policy record from metadata and spec.
	pub fn new(metadata: ObjectMeta, spec: ExporterAccessPolicySpec) -> Self {
		Self { metadata, spec, status: ExporterAccessPolicyStatus::default() }
	}
}
impl Resource for ExporterAccessPolicy {
	const KIND: &'static str = "ExporterAccessPolicy";

	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}

	fn metadata_mut(&mut self) -> &mut ObjectMeta {
		&mut self.metadata
	}
}
