mod common;

use common::{harness, harness_from, set_test_value, test_value};
use hardline_app::{BatchControl, CancellationToken};
use hardline_catalog::StaticSource;
use hardline_exec::HostError;
use hardline_settings::Profile;
use hardline_store::ChangeLog;
use hardline_test_util::policies::{
    registry_policy, requires, service_policy, with_builds,
};
use hardline_types::{ApplyRequest, PolicyId, ServiceStartupType, ids};
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

fn ids_of(list: &[PolicyId]) -> Vec<&str> {
    list.iter().map(PolicyId::as_str).collect()
}

fn services() -> Vec<hardline_types::PolicyDefinition> {
    vec![
        service_policy("svc-001", "DiagTrack", ServiceStartupType::Disabled),
        requires(
            service_policy("svc-002", "dmwappushservice", ServiceStartupType::Disabled),
            &["svc-001"],
        ),
    ]
}

#[test]
fn failed_dependency_halts_the_batch_before_its_dependent() {
    let h = harness(services());
    h.host.services.install("DiagTrack", "Automatic", true);
    h.host.services.install("dmwappushservice", "Automatic", false);
    h.host.services.fail("DiagTrack");

    let mut request = ApplyRequest::new(["svc-002"]);
    request.continue_on_error = false;
    let resp = h.engine.apply(&request);

    assert!(!resp.success);
    assert_eq!(ids_of(&resp.planned), vec!["svc-001", "svc-002"]);
    assert_eq!(ids_of(&resp.failed), vec!["svc-001"]);
    assert!(resp.applied.is_empty());
    assert_eq!(resp.changes.len(), 1);
    assert_eq!(resp.errors.len(), 1);
    assert_eq!(resp.errors[0].code, ids::CODE_EXECUTION_ERROR);
    assert_eq!(resp.errors[0].policy_id, Some(PolicyId::new("svc-001")));
    let untouched = h.host.services.info("dmwappushservice").expect("installed");
    assert_eq!(untouched.startup_type, "Automatic");
}

#[test]
fn continue_on_error_still_runs_later_policies() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
    ]);
    h.host.registry.deny(hardline_test_util::policies::TEST_KEY_PATH);
    let resp = h.engine.apply(&ApplyRequest::new(["a", "b"]));
    assert_eq!(ids_of(&resp.failed), vec!["a", "b"]);
    assert!(
        resp.errors
            .iter()
            .all(|e| e.code == ids::CODE_AUTHORIZATION_ERROR)
    );

    let h = harness(services());
    h.host.services.install("DiagTrack", "Automatic", true);
    h.host.services.install("dmwappushservice", "Automatic", false);
    h.host.services.fail("DiagTrack");
    let resp = h.engine.apply(&ApplyRequest::new(["svc-002"]));
    assert_eq!(ids_of(&resp.failed), vec!["svc-001"]);
    assert_eq!(ids_of(&resp.applied), vec!["svc-002"]);
}

#[test]
fn selected_atomic_policies_apply_without_their_siblings() {
    let h = common::fixture_harness();
    let resp = h.engine.apply(&ApplyRequest::new(["tel-004-a", "tel-004-c"]));
    assert!(resp.success, "{:?}", resp.errors);
    assert_eq!(ids_of(&resp.applied), vec!["tel-004-a", "tel-004-c"]);

    let audit = h.engine.audit(Some(&[
        PolicyId::new("tel-004-a"),
        PolicyId::new("tel-004-b"),
        PolicyId::new("tel-004-c"),
    ]));
    let applied: Vec<(&str, Option<bool>)> = audit
        .results
        .iter()
        .map(|r| (r.policy_id.as_str(), r.is_applied))
        .collect();
    assert_eq!(
        applied,
        vec![
            ("tel-004-a", Some(true)),
            ("tel-004-b", Some(false)),
            ("tel-004-c", Some(true)),
        ]
    );
}

#[test]
fn applying_twice_keeps_state_and_tool_applied_once() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    let first = h.engine.apply(&ApplyRequest::new(["tel-001"]));
    let second = h.engine.apply(&ApplyRequest::new(["tel-001"]));
    assert!(first.success && second.success);
    assert_eq!(test_value(&h.host, "AllowTelemetry").as_deref(), Some("0"));

    let audit = h.engine.audit(None);
    assert_eq!(audit.results[0].is_applied, Some(true));
    assert!(audit.results[0].tool_applied);

    let state = h.engine.get_state(false);
    assert_eq!(state.tool_applied.len(), 1);
    assert_eq!(state.tool_applied[0].policy_id.as_str(), "tel-001");
}

#[test]
fn dry_run_plans_without_touching_anything() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    let mut request = ApplyRequest::new(["tel-001"]);
    request.dry_run = true;
    request.create_restore_point = true;
    let resp = h.engine.apply(&request);

    assert!(resp.success);
    assert!(resp.dry_run);
    assert!(resp.changes.is_empty());
    assert_eq!(ids_of(&resp.planned), vec!["tel-001"]);
    assert!(!resp.snapshot_persisted);
    assert!(
        resp.snapshot_id
            .as_deref()
            .is_some_and(|id| id.starts_with(ids::UNPERSISTED_SNAPSHOT_PREFIX))
    );
    assert_eq!(test_value(&h.host, "AllowTelemetry"), None);
    assert_eq!(h.host.mutations(), 0);
    assert!(h.restore_points.created().is_empty());
    assert!(h.log.all_changes().expect("list").is_empty());
    assert!(h.log.list_snapshots().expect("list").is_empty());
}

#[test]
fn unknown_ids_are_errors_but_known_ones_still_apply() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    let resp = h.engine.apply(&ApplyRequest::new(["tel-001", "nope"]));
    assert!(!resp.success);
    assert_eq!(ids_of(&resp.applied), vec!["tel-001"]);
    assert_eq!(resp.errors.len(), 1);
    assert_eq!(resp.errors[0].code, ids::CODE_NOT_FOUND);
    assert_eq!(resp.errors[0].policy_id, Some(PolicyId::new("nope")));
}

#[test]
fn inapplicable_policies_are_skipped_not_failed() {
    let h = harness(vec![
        with_builds(registry_policy("future", "F", "1"), Some(99999), None),
        requires(registry_policy("child", "C", "1"), &["future"]),
    ]);

    let resp = h.engine.apply(&ApplyRequest::new(["child"]));
    assert!(resp.success, "{:?}", resp.errors);
    assert_eq!(ids_of(&resp.planned), vec!["child"]);
    assert_eq!(ids_of(&resp.applied), vec!["child"]);
    assert_eq!(resp.skipped.len(), 1);
    assert_eq!(resp.skipped[0].policy_id.as_str(), "future");
    assert!(resp.warnings.iter().any(|w| {
        w.code == ids::CODE_NOT_APPLICABLE && w.message.starts_with("dependency future skipped")
    }));
    assert_eq!(test_value(&h.host, "F"), None);

    let resp = h.engine.apply(&ApplyRequest::new(["future"]));
    assert!(resp.success);
    assert!(resp.planned.is_empty());
    assert_eq!(resp.skipped.len(), 1);
}

#[test]
fn batches_are_grouped_under_a_persisted_snapshot() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
    ]);
    let resp = h.engine.apply(&ApplyRequest::new(["a"]));
    assert!(resp.snapshot_persisted);
    let snapshot_id = resp.snapshot_id.clone().expect("snapshot id");

    let snapshot = h.log.snapshot(&snapshot_id).expect("get").expect("persisted");
    assert_eq!(snapshot.states.len(), 2, "the whole applicable catalog is captured");
    assert!(snapshot.states.iter().all(|s| !s.is_applied));
    assert_eq!(snapshot.system.windows_build, common::BUILD);

    let tagged = h.log.changes_by_snapshot(&snapshot_id).expect("list");
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].policy_id.as_str(), "a");
}

#[test]
fn store_failures_degrade_to_warnings() {
    let h = harness(vec![registry_policy("a", "A", "0")]);
    h.log.fail_writes(true);
    let resp = h.engine.apply(&ApplyRequest::new(["a"]));

    assert!(resp.success);
    assert_eq!(ids_of(&resp.applied), vec!["a"]);
    assert!(!resp.snapshot_persisted);
    assert!(
        resp.snapshot_id
            .as_deref()
            .is_some_and(|id| id.starts_with(ids::UNPERSISTED_SNAPSHOT_PREFIX))
    );
    let codes: Vec<&str> = resp.warnings.iter().map(|w| w.code.as_str()).collect();
    assert_eq!(
        codes,
        vec![ids::CODE_PERSISTENCE_ERROR, ids::CODE_PERSISTENCE_ERROR]
    );
    assert_eq!(test_value(&h.host, "A").as_deref(), Some("0"));
}

#[test]
fn restore_points_are_best_effort() {
    let h = harness(vec![registry_policy("a", "A", "0")]);
    let mut request = ApplyRequest::new(["a"]);
    request.create_restore_point = true;

    let resp = h.engine.apply(&request);
    assert_eq!(resp.restore_point_id.as_deref(), Some("rp-1"));
    let snapshot = h
        .log
        .snapshot(resp.snapshot_id.as_deref().expect("id"))
        .expect("get")
        .expect("some");
    assert_eq!(snapshot.restore_point_id.as_deref(), Some("rp-1"));

    h.restore_points
        .fail_with(HostError::Failed("System Restore is throttled".to_string()));
    let resp = h.engine.apply(&request);
    assert!(resp.success);
    assert_eq!(resp.restore_point_id, None);
    assert!(
        resp.warnings
            .iter()
            .any(|w| w.code == ids::CODE_RESTORE_POINT_FAILED)
    );
}

#[test]
fn profiles_supply_ids_and_name_the_snapshot() {
    let source = Arc::new(StaticSource::new(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
    ]));
    let h = harness_from(source, |settings| {
        settings.profiles.insert(
            "baseline".to_string(),
            Profile {
                name: "baseline".to_string(),
                description: String::new(),
                policies: vec![PolicyId::new("b")],
            },
        );
    });

    let mut request = ApplyRequest::new(Vec::<String>::new());
    request.profile_name = Some("baseline".to_string());
    let resp = h.engine.apply(&request);
    assert_eq!(ids_of(&resp.applied), vec!["b"]);
    let snapshot = h.log.latest_snapshot(false).expect("get").expect("some");
    assert!(snapshot.description.contains("baseline"), "{}", snapshot.description);

    request.profile_name = Some("missing".to_string());
    let resp = h.engine.apply(&request);
    assert!(!resp.success);
    assert_eq!(resp.errors[0].code, ids::CODE_NOT_FOUND);
}

#[test]
fn configured_defaults_flow_into_requests() {
    let h = harness_from(Arc::new(StaticSource::new(Vec::new())), |settings| {
        settings.continue_on_error = false;
        settings.create_restore_point = true;
    });
    let request = h.engine.apply_request(["a"]);
    assert!(!request.continue_on_error);
    assert!(request.create_restore_point);
    assert!(!request.dry_run);
}

#[test]
fn cancellation_stops_between_policies() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
        registry_policy("c", "C", "0"),
    ]);
    let token = CancellationToken::new();
    let progress = RefCell::new(Vec::new());
    let control = BatchControl::new()
        .with_cancellation(token.clone())
        .on_progress(|p| {
            progress.borrow_mut().push((p.policy_id.to_string(), p.percent));
            token.cancel();
        });

    let resp = h.engine.apply_with(&ApplyRequest::new(["a", "b", "c"]), &control);

    assert!(resp.cancelled);
    assert!(!resp.success);
    assert_eq!(ids_of(&resp.applied), vec!["a"]);
    assert!(resp.failed.is_empty());
    assert_eq!(resp.errors[0].code, ids::CODE_CANCELLED);
    assert_eq!(*progress.borrow(), vec![("a".to_string(), 33)]);
    assert_eq!(test_value(&h.host, "B"), None);
}

#[test]
fn progress_is_reported_after_every_policy() {
    let h = harness(vec![
        registry_policy("a", "A", "0"),
        registry_policy("b", "B", "0"),
    ]);
    let seen = RefCell::new(Vec::new());
    let control = BatchControl::new().on_progress(|p| {
        seen.borrow_mut().push((p.processed, p.total, p.percent));
    });
    let resp = h.engine.apply_with(&ApplyRequest::new(["a", "b"]), &control);
    assert!(resp.success);
    assert_eq!(*seen.borrow(), vec![(1, 2, 50), (2, 2, 100)]);
}

#[test]
fn persisted_and_request_overrides_change_what_is_applied() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    let changed = h
        .engine
        .update_overrides(BTreeMap::from([(
            PolicyId::new("tel-001"),
            json!({ "expected_value": "1" }),
        )]))
        .expect("update");
    assert!(changed);

    let resp = h.engine.apply(&ApplyRequest::new(["tel-001"]));
    assert!(resp.success);
    assert_eq!(test_value(&h.host, "AllowTelemetry").as_deref(), Some("1"));

    let mut request = ApplyRequest::new(["tel-001"]);
    request
        .overrides
        .insert(PolicyId::new("tel-001"), json!({ "expected_value": "2" }));
    let resp = h.engine.apply(&request);
    assert!(resp.success);
    assert_eq!(test_value(&h.host, "AllowTelemetry").as_deref(), Some("2"));

    assert!(
        h.engine
            .remove_overrides(&[PolicyId::new("tel-001")])
            .expect("remove")
    );
    assert!(h.engine.overrides().expect("read").is_empty());
}

#[test]
fn invalid_overrides_are_skipped_with_a_warning() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    let mut request = ApplyRequest::new(["tel-001"]);
    request
        .overrides
        .insert(PolicyId::new("tel-001"), json!({ "type": "service" }));
    let resp = h.engine.apply(&request);

    assert!(resp.success);
    assert_eq!(test_value(&h.host, "AllowTelemetry").as_deref(), Some("0"));
    assert!(
        resp.warnings
            .iter()
            .any(|w| w.code == ids::CODE_OVERRIDE_INVALID)
    );
}

#[test]
fn existing_values_are_overwritten_and_recorded() {
    let h = harness(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
    set_test_value(&h.host, "AllowTelemetry", "3");
    let resp = h.engine.apply(&ApplyRequest::new(["tel-001"]));
    assert!(resp.success);
    assert!(resp.changes[0].previous_state.is_some());
    assert_eq!(test_value(&h.host, "AllowTelemetry").as_deref(), Some("0"));
}
