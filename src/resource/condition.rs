//! Structured status conditions written by reconcilers.

// self
use crate::_prelude::*;

/// Condition kinds recorded across lease and exporter statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
	/// Lease holds an exporter and access is live.
	Ready,
	/// Lease is waiting on a deadline or on exporter availability.
	Pending,
	/// Lease can never be satisfied with the current cluster state.
	Unsatisfiable,
	/// Lease spec failed validation.
	Invalid,
	/// Exporter heartbeats are fresh and the exporter did not self-report offline.
	Online,
	/// Exporter has reported its device list.
	Registered,
}
impl ConditionType {
	/// Returns a stable label suitable for logs and serialized status.
	pub const fn as_str(self) -> &'static str {
		match self {
			ConditionType::Ready => "Ready",
			ConditionType::Pending => "Pending",
			ConditionType::Unsatisfiable => "Unsatisfiable",
			ConditionType::Invalid => "Invalid",
			ConditionType::Online => "Online",
			ConditionType::Registered => "Registered",
		}
	}
}
impl Display for ConditionType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Machine-readable condition reasons.
pub mod reason {
	/// Lease acquired an exporter.
	pub const ACQUIRED: &str = "acquired";
	/// Lease begin time is still in the future.
	pub const SCHEDULED: &str = "scheduled";
	/// Lease was released by its client.
	pub const RELEASED: &str = "released";
	/// Lease reached its effective end.
	pub const EXPIRED: &str = "expired";
	/// Lease selector carries no constraints.
	pub const EMPTY_SELECTOR: &str = "EmptySelector";
	/// No exporter labels satisfy the selector.
	pub const NO_MATCH: &str = "NoMatch";
	/// Matching exporters exist but no policy approves the client.
	pub const NO_ACCESS: &str = "NoAccess";
	/// Approved exporters exist but none is online.
	pub const OFFLINE: &str = "Offline";
	/// Approved, online exporters exist but all are leased.
	pub const NOT_AVAILABLE: &str = "NotAvailable";
	/// Lease temporal fields are missing or inconsistent.
	pub const INVALID_WINDOW: &str = "InvalidWindow";
	/// Online state derived from heartbeat freshness.
	pub const SEEN: &str = "Seen";
	/// Exporter registration state derived from its reported device list.
	pub const REGISTERED: &str = "Registered";
}

/// One structured status entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
	/// Condition kind.
	#[serde(rename = "type")]
	pub condition_type: ConditionType,
	/// Whether the condition currently holds.
	pub status: bool,
	/// Machine-readable reason (see [`reason`]).
	pub reason: String,
	/// Human-readable explanation.
	pub message: String,
	/// Spec generation the condition was computed against.
	pub observed_generation: u64,
	/// Instant the condition last changed status.
	pub last_transition_time: OffsetDateTime,
}
impl Condition {
	/// Builds a condition stamped at the provided instant.
	pub fn new(
		condition_type: ConditionType,
		status: bool,
		reason: impl Into<String>,
		message: impl Into<String>,
		observed_generation: u64,
		now: OffsetDateTime,
	) -> Self {
		Self {
			condition_type,
			status,
			reason: reason.into(),
			message: message.into(),
			observed_generation,
			last_transition_time: now,
		}
	}
}

/// Inserts or replaces the condition of the candidate's type.
///
/// The transition time is preserved when the status did not flip, so callers can stamp
/// candidates with `now` unconditionally.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut candidate: Condition) {
	match conditions.iter_mut().find(|c| c.condition_type == candidate.condition_type) {
		Some(existing) => {
			if existing.status == candidate.status {
				candidate.last_transition_time = existing.last_transition_time;
			}

			*existing = candidate;
		},
		None => conditions.push(candidate),
	}
}

/// Looks up the condition of the provided type.
pub fn find_condition(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
	conditions.iter().find(|c| c.condition_type == condition_type)
}

/// Returns `true` when the condition of the provided type currently holds.
pub fn condition_holds(conditions: &[Condition], condition_type: ConditionType) -> bool {
	find_condition(conditions, condition_type).is_some_and(|c| c.status)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn upsert_preserves_transition_time_when_status_unchanged() {
		let first = macros::datetime!(2026-01-01 00:00 UTC);
		let later = macros::datetime!(2026-01-01 00:05 UTC);
		let mut conditions = Vec::new();

		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Pending, true, reason::SCHEDULED, "", 1, first),
		);
		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Pending, true, reason::OFFLINE, "", 2, later),
		);

		let pending = find_condition(&conditions, ConditionType::Pending)
			.expect("Pending condition should be present.");

		assert_eq!(pending.last_transition_time, first, "Same status keeps the transition time.");
		assert_eq!(pending.reason, reason::OFFLINE);
		assert_eq!(pending.observed_generation, 2);
	}

	#[test]
	fn upsert_stamps_transition_time_on_status_flip() {
		let first = macros::datetime!(2026-01-01 00:00 UTC);
		let later = macros::datetime!(2026-01-01 00:05 UTC);
		let mut conditions = Vec::new();

		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Online, true, reason::SEEN, "", 1, first),
		);
		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Online, false, reason::SEEN, "stale", 1, later),
		);

		let online = find_condition(&conditions, ConditionType::Online)
			.expect("Online condition should be present.");

		assert_eq!(online.last_transition_time, later);
		assert!(!condition_holds(&conditions, ConditionType::Online));
	}

	#[test]
	fn distinct_types_accumulate() {
		let now = macros::datetime!(2026-01-01 00:00 UTC);
		let mut conditions = Vec::new();

		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Online, true, reason::SEEN, "", 1, now),
		);
		upsert_condition(
			&mut conditions,
			Condition::new(ConditionType::Registered, true, reason::REGISTERED, "", 1, now),
		);

		assert_eq!(conditions.len(), 2);
	}
}
