//! Access-policy evaluation: which exporters a client may lease, and how preferentially.

// self
use crate::{
	_prelude::*,
	resource::{Client, Exporter, ExporterAccessPolicy, ResourceName},
};

/// One grant connecting a client to an exporter through a policy rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovedExporter<'a> {
	/// The approved exporter.
	pub exporter: &'a Exporter,
	/// Policy record the grant came from.
	pub policy: ResourceName,
	/// Rule priority; higher wins during candidate ordering.
	pub priority: i32,
	/// Spot grants are lowest preference and chosen only when no dedicated grant applies.
	pub spot_access: bool,
	/// Lease currently holding the exporter, if any.
	pub existing_lease: Option<ResourceName>,
}

/// Computes every grant admitting the client to one of the exporters at the provided instant.
///
/// Access is default-deny: an exporter covered by no matching rule yields no entry.
pub fn approved_exporters<'a>(
	policies: &[ExporterAccessPolicy],
	client: &Client,
	exporters: &'a [Exporter],
	now: OffsetDateTime,
) -> Vec<ApprovedExporter<'a>> {
	let mut out = Vec::new();

	for exporter in exporters {
		for policy in policies {
			if !policy.spec.exporter_selector.matches(&exporter.metadata.labels) {
				continue;
			}

			for rule in &policy.spec.policies {
				if !rule.applies_to(&client.metadata.labels, now) {
					continue;
				}

				out.push(ApprovedExporter {
					exporter,
					policy: policy.metadata.name.clone(),
					priority: rule.priority,
					spot_access: rule.spot_access,
					existing_lease: exporter.status.lease_ref.clone(),
				});
			}
		}
	}

	out
}

/// Returns `true` when any grant for the exporter is dedicated (non-spot).
pub fn has_dedicated_grant(grants: &[ApprovedExporter<'_>], exporter: &ResourceName) -> bool {
	grants
		.iter()
		.any(|grant| grant.exporter.metadata.name == *exporter && !grant.spot_access)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::{client_fixture, exporter_fixture, policy_fixture},
		resource::{AccessRule, LabelSelector, TimeWindow},
	};

	fn now() -> OffsetDateTime {
		macros::datetime!(2026-03-01 12:00 UTC)
	}

	#[test]
	fn no_policy_means_no_access() {
		let client = client_fixture("c-1", &[("team", "kernel")]);
		let exporters = vec![exporter_fixture("e-1", &[("dut", "a")])];

		assert!(approved_exporters(&[], &client, &exporters, now()).is_empty());
	}

	#[test]
	fn grants_intersect_exporter_and_client_selectors() {
		let client = client_fixture("c-1", &[("team", "kernel")]);
		let exporters = vec![
			exporter_fixture("e-1", &[("dut", "a")]),
			exporter_fixture("e-2", &[("dut", "b")]),
		];
		let policy = policy_fixture("p-1", &[("dut", "a")], &[("team", "kernel")], 5, false);
		let grants = approved_exporters(&[policy], &client, &exporters, now());

		assert_eq!(grants.len(), 1);
		assert_eq!(grants[0].exporter.metadata.name.as_ref(), "e-1");
		assert_eq!(grants[0].priority, 5);
		assert!(!grants[0].spot_access);
	}

	#[test]
	fn mismatched_clients_get_nothing() {
		let client = client_fixture("c-1", &[("team", "graphics")]);
		let exporters = vec![exporter_fixture("e-1", &[("dut", "a")])];
		let policy = policy_fixture("p-1", &[("dut", "a")], &[("team", "kernel")], 5, false);

		assert!(approved_exporters(&[policy], &client, &exporters, now()).is_empty());
	}

	#[test]
	fn every_matching_rule_emits_a_grant() {
		let client = client_fixture("c-1", &[("team", "kernel")]);
		let exporters = vec![exporter_fixture("e-1", &[("dut", "a")])];
		let mut policy = policy_fixture("p-1", &[("dut", "a")], &[("team", "kernel")], 5, false);

		policy.spec.policies.push(AccessRule {
			priority: 1,
			from: vec![LabelSelector::matching([("team", "kernel")])],
			spot_access: true,
			window: None,
		});

		let grants = approved_exporters(&[policy], &client, &exporters, now());

		assert_eq!(grants.len(), 2);
		assert!(has_dedicated_grant(&grants, &grants[0].exporter.metadata.name));
	}

	#[test]
	fn dormant_windows_suppress_rules() {
		let client = client_fixture("c-1", &[("team", "kernel")]);
		let exporters = vec![exporter_fixture("e-1", &[("dut", "a")])];
		let mut policy = policy_fixture("p-1", &[("dut", "a")], &[("team", "kernel")], 5, false);

		policy.spec.policies[0].window =
			Some(TimeWindow { start: macros::time!(00:00), end: macros::time!(06:00) });

		assert!(approved_exporters(&[policy.clone()], &client, &exporters, now()).is_empty());
		assert_eq!(
			approved_exporters(
				&[policy],
				&client,
				&exporters,
				macros::datetime!(2026-03-01 03:00 UTC),
			)
			.len(),
			1
		);
	}

	#[test]
	fn spot_only_grants_classify_as_spot() {
		let client = client_fixture("c-1", &[("team", "kernel")]);
		let exporters = vec![exporter_fixture("e-1", &[("dut", "a")])];
		let policy = policy_fixture("p-1", &[("dut", "a")], &[("team", "kernel")], 5, true);
		let grants = approved_exporters(&[policy], &client, &exporters, now());

		assert_eq!(grants.len(), 1);
		assert!(grants[0].spot_access);
		assert!(!has_dedicated_grant(&grants, &grants[0].exporter.metadata.name));
	}
}
