//! Builders for change records and snapshots.

use hardline_types::{
    ChangeRecord, Mechanism, Operation, PolicyId, Snapshot, SnapshotPolicyState, SystemInfo,
};
use time::OffsetDateTime;
use time::macros::datetime;

/// Fixed base instant so ordering tests read naturally: `at(0)`, `at(60)`, ...
pub fn at(seconds: i64) -> OffsetDateTime {
    datetime!(2026-01-01 00:00 UTC) + time::Duration::seconds(seconds)
}

/// Successful registry change for `policy_id` with the given states.
pub fn change(
    id: &str,
    policy_id: &str,
    operation: Operation,
    applied_at: OffsetDateTime,
    previous_state: &str,
    new_state: &str,
) -> ChangeRecord {
    ChangeRecord {
        change_id: id.to_string(),
        operation,
        policy_id: PolicyId::new(policy_id),
        mechanism: Mechanism::Registry,
        applied_at,
        previous_state: Some(previous_state.to_string()),
        new_state: Some(new_state.to_string()),
        success: true,
        error_message: None,
        failure_kind: None,
        snapshot_id: None,
        description: format!("{} {policy_id}", operation.as_str()),
    }
}

pub fn in_snapshot(mut record: ChangeRecord, snapshot_id: &str) -> ChangeRecord {
    record.snapshot_id = Some(snapshot_id.to_string());
    record
}

pub fn state(policy_id: &str, is_applied: bool, value: Option<&str>) -> SnapshotPolicyState {
    SnapshotPolicyState {
        policy_id: PolicyId::new(policy_id),
        is_applied,
        current_value: value.map(str::to_string),
    }
}

pub fn snapshot(id: &str, created_at: OffsetDateTime, states: Vec<SnapshotPolicyState>) -> Snapshot {
    Snapshot {
        snapshot_id: id.to_string(),
        description: format!("snapshot {id}"),
        created_at,
        system: SystemInfo {
            windows_build: 22631,
            sku: "Professional".to_string(),
            os_version: "Windows 11 Pro 23H2".to_string(),
        },
        restore_point_id: None,
        catalog_fingerprint: "0".repeat(64),
        states,
    }
}
