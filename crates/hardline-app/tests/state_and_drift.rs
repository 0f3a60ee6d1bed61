mod common;

use common::{harness, set_test_value};
use hardline_store::ChangeLog;
use hardline_test_util::policies::{registry_policy, with_builds, with_category};
use hardline_types::{ApplyRequest, Operation, PolicyId, RevertRequest, ids};

#[test]
fn drift_reports_exactly_the_policy_that_changed_underneath() {
    let h = harness(vec![
        registry_policy("p1", "P1", "0"),
        registry_policy("p2", "P2", "0"),
        registry_policy("p3", "P3", "0"),
    ]);
    assert!(h.engine.apply(&ApplyRequest::new(["p1", "p2"])).success);
    set_test_value(&h.host, "P1", "1");

    let resp = h.engine.detect_drift(None);

    assert!(resp.success, "{:?}", resp.errors);
    assert_eq!(resp.checked, 3);
    assert_eq!(resp.drift.len(), 1);
    let item = &resp.drift[0];
    assert_eq!(item.policy_id.as_str(), "p1");
    assert!(item.expected_applied);
    assert!(!item.actual_applied);
    assert_eq!(item.expected_value.as_deref(), Some("0"));
    assert_eq!(item.actual_value.as_deref(), Some("1"));
}

#[test]
fn a_clean_host_has_no_drift() {
    let h = harness(vec![registry_policy("p1", "P1", "0")]);
    assert!(h.engine.apply(&ApplyRequest::new(["p1"])).success);
    let resp = h.engine.detect_drift(None);
    assert!(resp.success);
    assert!(resp.drift.is_empty());
}

#[test]
fn drift_against_a_named_snapshot_uses_that_baseline() {
    let h = harness(vec![registry_policy("p1", "P1", "0")]);
    let baseline = h.engine.create_snapshot("clean install", false);
    let baseline_id = baseline.snapshot.expect("snapshot").snapshot_id;
    assert!(h.engine.apply(&ApplyRequest::new(["p1"])).success);

    let against_baseline = h.engine.detect_drift(Some(&baseline_id));
    assert_eq!(against_baseline.drift.len(), 1);
    assert!(!against_baseline.drift[0].expected_applied);

    assert!(h.engine.detect_drift(None).drift.is_empty());
}

#[test]
fn drift_without_any_snapshot_is_an_error() {
    let h = harness(vec![registry_policy("p1", "P1", "0")]);
    let resp = h.engine.detect_drift(None);
    assert!(!resp.success);
    assert_eq!(resp.errors[0].code, ids::CODE_NO_SNAPSHOT);

    let resp = h.engine.detect_drift(Some("missing"));
    assert_eq!(resp.errors[0].code, ids::CODE_NO_SNAPSHOT);
}

#[test]
fn policies_gone_from_the_catalog_are_warnings_not_drift() {
    let h = harness(vec![registry_policy("p1", "P1", "0")]);
    let mut snapshot = hardline_test_util::changes::snapshot(
        "s1",
        hardline_test_util::changes::at(0),
        vec![
            hardline_test_util::changes::state("p1", false, None),
            hardline_test_util::changes::state("retired", true, Some("1")),
        ],
    );
    snapshot.description = "imported".to_string();
    h.log.create_snapshot(&snapshot).expect("seed");

    let resp = h.engine.detect_drift(Some("s1"));
    assert!(resp.success);
    assert!(resp.drift.is_empty());
    assert_eq!(resp.checked, 1);
    assert_eq!(resp.warnings.len(), 1);
    assert_eq!(resp.warnings[0].policy_id, Some(PolicyId::new("retired")));
}

#[test]
fn audit_summarizes_applicability_and_state() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
        with_builds(registry_policy("old", "O", "0"), None, Some(19045)),
    ]);
    set_test_value(&h.host, "B", "0");
    let before = h.host.mutations();

    let resp = h.engine.audit(None);

    assert!(resp.success);
    assert_eq!(resp.system.windows_build, common::BUILD);
    assert_eq!(resp.summary.total, 3);
    assert_eq!(resp.summary.applied, 1);
    assert_eq!(resp.summary.not_applied, 1);
    assert_eq!(resp.summary.not_applicable, 1);
    let old = resp
        .results
        .iter()
        .find(|r| r.policy_id.as_str() == "old")
        .expect("old");
    assert!(!old.applicable);
    assert_eq!(old.is_applied, None);
    assert!(old.skip_reason.as_deref().is_some_and(|r| r.contains("19045")));
    let b = resp
        .results
        .iter()
        .find(|r| r.policy_id.as_str() == "b")
        .expect("b");
    assert_eq!(b.is_applied, Some(true));
    assert!(!b.tool_applied, "already compliant, but not by us");
    assert_eq!(h.host.mutations(), before);
}

#[test]
fn audit_of_unknown_ids_reports_them() {
    let h = harness(vec![registry_policy("a", "A", "0")]);
    let resp = h
        .engine
        .audit(Some(&[PolicyId::new("a"), PolicyId::new("zzz")]));
    assert!(!resp.success);
    assert_eq!(resp.results.len(), 1);
    assert_eq!(resp.errors[0].policy_id, Some(PolicyId::new("zzz")));
}

#[test]
fn state_lists_tool_applied_policies_and_optional_history() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
    ]);
    assert!(h.engine.apply(&ApplyRequest::new(["a", "b"])).success);
    assert!(h.engine.revert(&RevertRequest::policies(["b"])).success);

    let brief = h.engine.get_state(false);
    assert!(brief.success);
    let applied: Vec<&str> = brief
        .tool_applied
        .iter()
        .map(|p| p.policy_id.as_str())
        .collect();
    assert_eq!(applied, vec!["a"]);
    assert!(brief.latest_snapshot.is_some());
    assert!(brief.history.is_empty());
    assert!(brief.snapshots.is_empty());

    let full = h.engine.get_state(true);
    let ops: Vec<(&str, Operation)> = full
        .history
        .iter()
        .map(|c| (c.policy_id.as_str(), c.operation))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("a", Operation::Apply),
            ("b", Operation::Apply),
            ("b", Operation::Revert),
        ]
    );
    assert_eq!(full.snapshots.len(), 2, "one before apply, one before revert");
}

#[test]
fn explicit_snapshots_capture_every_applicable_policy() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        with_builds(registry_policy("old", "O", "0"), None, Some(19045)),
    ]);
    set_test_value(&h.host, "A", "0");

    let resp = h.engine.create_snapshot("manual", true);

    assert!(resp.success && resp.persisted);
    let snapshot = resp.snapshot.expect("snapshot");
    assert_eq!(snapshot.description, "manual");
    assert_eq!(snapshot.restore_point_id.as_deref(), Some("rp-1"));
    assert_eq!(snapshot.states.len(), 1);
    assert!(snapshot.states[0].is_applied);
    assert_eq!(snapshot.states[0].current_value.as_deref(), Some("0"));
    assert!(h.log.snapshot(&snapshot.snapshot_id).expect("get").is_some());
}

#[test]
fn policies_can_be_filtered_by_category_and_host() {
    let h = harness(vec![
        with_category(registry_policy("a", "A", "0"), "telemetry"),
        with_category(registry_policy("b", "B", "0"), "services"),
        with_category(
            with_builds(registry_policy("c", "C", "0"), Some(99999), None),
            "telemetry",
        ),
    ]);

    let ids = |resp: hardline_types::PoliciesResponse| -> Vec<String> {
        resp.policies
            .into_iter()
            .map(|p| p.policy_id.to_string())
            .collect()
    };
    assert_eq!(ids(h.engine.get_policies(None, false)), vec!["a", "b", "c"]);
    assert_eq!(
        ids(h.engine.get_policies(Some("Telemetry"), false)),
        vec!["a", "c"]
    );
    assert_eq!(ids(h.engine.get_policies(Some("telemetry"), true)), vec!["a"]);
}
