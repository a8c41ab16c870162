//! Lease records: time-window normalization, state derivation, and bookkeeping labels.

// self
use crate::{
	_prelude::*,
	resource::{
		Condition, LabelSelector, ObjectMeta, Resource, ResourceName, SelectorRequirement,
	},
};

/// Label stamped onto a lease when it ends, so active leases can be enumerated with an
/// indexed label query instead of a status scan.
pub const ENDED_LABEL: &str = "hil-broker.dev/ended";
/// Tolerance applied when comparing second-precision instants and durations.
pub const WINDOW_TOLERANCE: Duration = Duration::SECOND;

/// Validation failures for client-supplied lease input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum LeaseValidationError {
	/// The selector carries no constraints and would match every exporter.
	#[error("Lease selector must carry at least one constraint.")]
	EmptySelector,
	/// No combination of begin/end/duration was provided.
	#[error("Lease requires a duration, an end time, or both bounds.")]
	MissingWindow,
	/// The provided or derived duration is zero or negative.
	#[error("Lease duration must be positive.")]
	NonPositiveDuration,
	/// Begin, end, and duration were all provided but disagree beyond tolerance.
	#[error("Lease begin, end, and duration are inconsistent.")]
	InconsistentWindow,
}
impl LeaseValidationError {
	/// Stable reason label recorded on `Invalid` conditions.
	pub const fn reason(&self) -> &'static str {
		match self {
			LeaseValidationError::EmptySelector => crate::resource::condition::reason::EMPTY_SELECTOR,
			LeaseValidationError::MissingWindow
			| LeaseValidationError::NonPositiveDuration
			| LeaseValidationError::InconsistentWindow =>
				crate::resource::condition::reason::INVALID_WINDOW,
		}
	}
}

/// The `(begin, end, duration)` triple of a lease spec.
///
/// Normalization derives the missing members so that exactly one consistent triple holds,
/// and is idempotent: applying it to an already-normalized window yields the same window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseWindow {
	/// Requested acquisition instant; `None` means immediate.
	pub begin_time: Option<OffsetDateTime>,
	/// Requested end instant.
	pub end_time: Option<OffsetDateTime>,
	/// Requested holding duration.
	pub duration: Option<Duration>,
}
impl LeaseWindow {
	/// Extracts the window from a lease spec.
	pub fn of_spec(spec: &LeaseSpec) -> Self {
		Self { begin_time: spec.begin_time, end_time: spec.end_time, duration: spec.duration }
	}

	/// Derives the missing members and verifies consistency.
	///
	/// An end time in the past is accepted here; such a lease ends on its first
	/// reconciliation instead of being rejected up front.
	pub fn normalize(self) -> Result<Self, LeaseValidationError> {
		match (self.begin_time, self.end_time, self.duration) {
			(None, None, None) | (Some(_), None, None) => Err(LeaseValidationError::MissingWindow),
			(None, None, Some(duration)) => {
				ensure_positive(duration)?;

				Ok(self)
			},
			(Some(begin), None, Some(duration)) => {
				ensure_positive(duration)?;

				Ok(Self { end_time: Some(begin + duration), ..self })
			},
			(Some(begin), Some(end), None) => {
				let duration = end - begin;

				ensure_positive(duration)?;

				Ok(Self { duration: Some(duration), ..self })
			},
			(None, Some(end), Some(duration)) => {
				ensure_positive(duration)?;

				Ok(Self { begin_time: Some(end - duration), ..self })
			},
			// An immediate lease bounded only by its end instant; the holding duration is
			// whatever remains at acquisition.
			(None, Some(_), None) => Ok(self),
			(Some(begin), Some(end), Some(duration)) => {
				ensure_positive(duration)?;

				if ((end - begin) - duration).abs() > WINDOW_TOLERANCE {
					return Err(LeaseValidationError::InconsistentWindow);
				}

				Ok(self)
			},
		}
	}
}

fn ensure_positive(duration: Duration) -> Result<(), LeaseValidationError> {
	if duration.is_positive() { Ok(()) } else { Err(LeaseValidationError::NonPositiveDuration) }
}

/// Derived lifecycle state of a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseState {
	/// Waiting for an exporter.
	Pending,
	/// Begin time is in the future; no exporter held yet.
	Scheduled,
	/// Exporter held; access is live.
	Active,
	/// Terminal.
	Ended,
}

/// Client-supplied lease request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSpec {
	/// Requesting client, in the lease's namespace.
	pub client_ref: ResourceName,
	/// Label match the exporter must satisfy.
	pub selector: LabelSelector,
	/// Requested acquisition instant; `None` means immediate.
	#[serde(default)]
	pub begin_time: Option<OffsetDateTime>,
	/// Requested end instant.
	#[serde(default)]
	pub end_time: Option<OffsetDateTime>,
	/// Requested holding duration.
	#[serde(default)]
	pub duration: Option<Duration>,
	/// Ends the lease at the next reconciliation when set.
	#[serde(default)]
	pub release: bool,
}
impl LeaseSpec {
	/// Normalized window view of the spec.
	pub fn window(&self) -> Result<LeaseWindow, LeaseValidationError> {
		LeaseWindow::of_spec(self).normalize()
	}
}

/// Reconciler-owned lease status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseStatus {
	/// Actual acquisition instant.
	#[serde(default)]
	pub begin_time: Option<OffsetDateTime>,
	/// Actual end instant.
	#[serde(default)]
	pub end_time: Option<OffsetDateTime>,
	/// Exporter currently held by the lease.
	#[serde(default)]
	pub exporter_ref: Option<ResourceName>,
	/// Terminal flag.
	#[serde(default)]
	pub ended: bool,
	/// Structured conditions (`Ready`, `Pending`, `Unsatisfiable`, `Invalid`).
	#[serde(default)]
	pub conditions: Vec<Condition>,
}

/// Time-bounded exclusive binding of a client to an exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
	/// Shared record metadata.
	pub metadata: ObjectMeta,
	/// Client-supplied request.
	pub spec: LeaseSpec,
	/// Reconciler-owned status.
	#[serde(default)]
	pub status: LeaseStatus,
}
impl Lease {
	/// Creates a lease record from metadata and spec.
	pub fn new(metadata: ObjectMeta, spec: LeaseSpec) -> Self {
		Self { metadata, spec, status: LeaseStatus::default() }
	}

	/// Derives the lifecycle state at the provided instant.
	pub fn state_at(&self, now: OffsetDateTime) -> LeaseState {
		if self.status.ended {
			return LeaseState::Ended;
		}
		if self.status.exporter_ref.is_some() {
			return LeaseState::Active;
		}
		if self.spec.begin_time.is_some_and(|begin| begin > now) {
			return LeaseState::Scheduled;
		}

		LeaseState::Pending
	}

	/// Instant at which an active lease ceases: the earlier of `status.begin + spec.duration`
	/// and `spec.end_time`.
	pub fn effective_end(&self) -> Option<OffsetDateTime> {
		let from_duration = match (self.status.begin_time, self.spec.duration) {
			(Some(begin), Some(duration)) => Some(begin + duration),
			_ => None,
		};

		match (from_duration, self.spec.end_time) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(Some(a), None) => Some(a),
			(None, b) => b,
		}
	}

	/// Real holding window: `end - begin` once ended, `now - begin` while held.
	///
	/// Derived from status instants only; an explicit past begin time in the spec never
	/// backdates the reported window.
	pub fn effective_duration_at(&self, now: OffsetDateTime) -> Option<Duration> {
		let begin = self.status.begin_time?;

		if self.status.ended {
			return self.status.end_time.map(|end| end - begin);
		}

		Some(now - begin)
	}

	/// Stamps the bookkeeping label marking this lease as ended.
	pub fn mark_ended_label(&mut self) {
		self.metadata.labels.insert(ENDED_LABEL.to_owned(), "true".to_owned());
	}

	/// Returns `true` when the bookkeeping ended label is present.
	pub fn has_ended_label(&self) -> bool {
		self.metadata.labels.contains_key(ENDED_LABEL)
	}

	/// Selector enumerating leases that have not ended.
	pub fn active_selector() -> LabelSelector {
		LabelSelector::default().with_requirement(SelectorRequirement::exists(ENDED_LABEL, false))
	}
}
impl Resource for Lease {
	const KIND: &'static str = "Lease";

	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}

	fn metadata_mut(&mut self) -> &mut ObjectMeta {
		&mut self.metadata
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::resource::Namespace;

	fn window(
		begin: Option<OffsetDateTime>,
		end: Option<OffsetDateTime>,
		duration: Option<Duration>,
	) -> LeaseWindow {
		LeaseWindow { begin_time: begin, end_time: end, duration }
	}

	fn lease_with(spec: LeaseSpec) -> Lease {
		Lease::new(
			ObjectMeta::new(
				Namespace::new("lab").expect("Namespace fixture should be valid."),
				ResourceName::new("lease-1").expect("Lease name fixture should be valid."),
			),
			spec,
		)
	}

	fn spec() -> LeaseSpec {
		LeaseSpec {
			client_ref: ResourceName::new("client-1")
				.expect("Client reference fixture should be valid."),
			selector: LabelSelector::matching([("dut", "a")]),
			begin_time: None,
			end_time: None,
			duration: Some(Duration::seconds(30)),
			release: false,
		}
	}

	#[test]
	fn duration_only_stays_unbounded() {
		let normalized = window(None, None, Some(Duration::seconds(30)))
			.normalize()
			.expect("Duration-only window should normalize.");

		assert_eq!(normalized.begin_time, None);
		assert_eq!(normalized.end_time, None);
		assert_eq!(normalized.duration, Some(Duration::seconds(30)));
	}

	#[test]
	fn begin_plus_duration_derives_end() {
		let begin = macros::datetime!(2026-03-01 10:00 UTC);
		let normalized = window(Some(begin), None, Some(Duration::minutes(5)))
			.normalize()
			.expect("Begin + duration should normalize.");

		assert_eq!(normalized.end_time, Some(macros::datetime!(2026-03-01 10:05 UTC)));
	}

	#[test]
	fn bounds_derive_duration() {
		let begin = macros::datetime!(2026-03-01 10:00 UTC);
		let end = macros::datetime!(2026-03-01 10:05 UTC);
		let normalized =
			window(Some(begin), Some(end), None).normalize().expect("Bounds should normalize.");

		assert_eq!(normalized.duration, Some(Duration::minutes(5)));
	}

	#[test]
	fn end_plus_duration_derives_begin() {
		let end = macros::datetime!(2026-03-01 10:05 UTC);
		let normalized = window(None, Some(end), Some(Duration::minutes(5)))
			.normalize()
			.expect("End + duration should normalize.");

		assert_eq!(normalized.begin_time, Some(macros::datetime!(2026-03-01 10:00 UTC)));
	}

	#[test]
	fn end_only_is_accepted_even_in_the_past() {
		let end = macros::datetime!(2020-01-01 00:00 UTC);
		let normalized =
			window(None, Some(end), None).normalize().expect("End-only window should normalize.");

		assert_eq!(normalized.begin_time, None);
		assert_eq!(normalized.duration, None);
	}

	#[test]
	fn consistent_triple_passes_within_tolerance() {
		let begin = macros::datetime!(2026-03-01 10:00:00 UTC);
		let end = macros::datetime!(2026-03-01 10:05:01 UTC);
		let result = window(Some(begin), Some(end), Some(Duration::minutes(5))).normalize();

		assert!(result.is_ok(), "One second of disagreement falls within tolerance.");

		let end = macros::datetime!(2026-03-01 10:05:02 UTC);
		let result = window(Some(begin), Some(end), Some(Duration::minutes(5))).normalize();

		assert_eq!(result, Err(LeaseValidationError::InconsistentWindow));
	}

	#[test]
	fn degenerate_windows_are_rejected() {
		assert_eq!(window(None, None, None).normalize(), Err(LeaseValidationError::MissingWindow));
		assert_eq!(
			window(Some(macros::datetime!(2026-03-01 10:00 UTC)), None, None).normalize(),
			Err(LeaseValidationError::MissingWindow)
		);
		assert_eq!(
			window(None, None, Some(Duration::ZERO)).normalize(),
			Err(LeaseValidationError::NonPositiveDuration)
		);
		assert_eq!(
			window(None, None, Some(Duration::seconds(-5))).normalize(),
			Err(LeaseValidationError::NonPositiveDuration)
		);

		let begin = macros::datetime!(2026-03-01 10:05 UTC);
		let end = macros::datetime!(2026-03-01 10:00 UTC);

		assert_eq!(
			window(Some(begin), Some(end), None).normalize(),
			Err(LeaseValidationError::NonPositiveDuration)
		);
	}

	#[test]
	fn normalization_is_idempotent() {
		let samples = [
			window(None, None, Some(Duration::seconds(30))),
			window(Some(macros::datetime!(2026-03-01 10:00 UTC)), None, Some(Duration::minutes(5))),
			window(
				Some(macros::datetime!(2026-03-01 10:00 UTC)),
				Some(macros::datetime!(2026-03-01 10:05 UTC)),
				None,
			),
			window(None, Some(macros::datetime!(2026-03-01 10:05 UTC)), Some(Duration::minutes(5))),
			window(None, Some(macros::datetime!(2026-03-01 10:05 UTC)), None),
		];

		for sample in samples {
			let once = sample.normalize().expect("Sample window should normalize.");
			let twice = once.normalize().expect("Normalized window should normalize again.");

			assert_eq!(once, twice, "Normalization must be idempotent.");
		}
	}

	#[test]
	fn serde_round_trip_preserves_normalized_windows() {
		let normalized = window(
			Some(macros::datetime!(2026-03-01 10:00 UTC)),
			None,
			Some(Duration::minutes(5)),
		)
		.normalize()
		.expect("Window fixture should normalize.");
		let payload =
			serde_json::to_string(&normalized).expect("Window should serialize to JSON.");
		let round_trip: LeaseWindow =
			serde_json::from_str(&payload).expect("Window should deserialize from JSON.");

		assert_eq!(
			round_trip.normalize().expect("Round-tripped window should normalize."),
			normalized
		);
	}

	#[test]
	fn state_derivation_follows_status_then_spec() {
		let now = macros::datetime!(2026-03-01 10:00 UTC);
		let mut lease = lease_with(spec());

		assert_eq!(lease.state_at(now), LeaseState::Pending);

		lease.spec.begin_time = Some(now + Duration::minutes(1));

		assert_eq!(lease.state_at(now), LeaseState::Scheduled);

		lease.status.exporter_ref =
			Some(ResourceName::new("exporter-1").expect("Exporter name fixture should be valid."));

		assert_eq!(lease.state_at(now), LeaseState::Active);

		lease.status.ended = true;

		assert_eq!(lease.state_at(now), LeaseState::Ended);
	}

	#[test]
	fn effective_end_takes_earlier_bound() {
		let begin = macros::datetime!(2026-03-01 10:00 UTC);
		let mut lease = lease_with(spec());

		lease.status.begin_time = Some(begin);

		assert_eq!(lease.effective_end(), Some(begin + Duration::seconds(30)));

		lease.spec.end_time = Some(begin + Duration::seconds(10));

		assert_eq!(lease.effective_end(), Some(begin + Duration::seconds(10)));

		lease.spec.end_time = Some(begin + Duration::minutes(5));

		assert_eq!(lease.effective_end(), Some(begin + Duration::seconds(30)));
	}

	#[test]
	fn effective_duration_reports_the_real_window() {
		let begin = macros::datetime!(2026-03-01 10:00 UTC);
		let now = macros::datetime!(2026-03-01 10:00:20 UTC);
		let mut lease = lease_with(spec());

		assert_eq!(lease.effective_duration_at(now), None);

		lease.status.begin_time = Some(begin);

		assert_eq!(lease.effective_duration_at(now), Some(Duration::seconds(20)));

		lease.status.ended = true;
		lease.status.end_time = Some(begin + Duration::seconds(25));

		assert_eq!(lease.effective_duration_at(now), Some(Duration::seconds(25)));
	}

	#[test]
	fn ended_label_round_trips_through_the_active_selector() {
		let mut lease = lease_with(spec());
		let selector = Lease::active_selector();

		assert!(selector.matches(&lease.metadata.labels));

		lease.mark_ended_label();

		assert!(lease.has_ended_label());
		assert!(!selector.matches(&lease.metadata.labels));
	}
}
