//! Expected-state derivation and comparison for drift detection.
//!
//! Probing the live host is the caller's job; this module only decides what the host should look
//! like according to a baseline snapshot and which probes disagree with it.

use crate::Catalog;
use crate::expected::expected_value;
use hardline_types::{ChangeRecord, DriftItem, Operation, PolicyId, Snapshot};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedState {
    pub policy_id: PolicyId,
    pub is_applied: bool,
    pub value: Option<String>,
}

/// Baseline rows overlaid with the successful changes tagged with that snapshot.
///
/// A snapshot is taken before its batch runs, so its rows are the pre-state; the batch's own
/// records move each touched policy to its post-state. Applied values come from the effective
/// catalog when the policy is still known.
pub fn expected_states(
    snapshot: &Snapshot,
    changes: &[ChangeRecord],
    catalog: &Catalog,
) -> Vec<ExpectedState> {
    let mut rows: BTreeMap<PolicyId, ExpectedState> = snapshot
        .states
        .iter()
        .map(|s| {
            (
                s.policy_id.clone(),
                ExpectedState {
                    policy_id: s.policy_id.clone(),
                    is_applied: s.is_applied,
                    value: s.current_value.clone(),
                },
            )
        })
        .collect();

    let mut batch: Vec<(usize, &ChangeRecord)> = changes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.success && c.snapshot_id.as_deref() == Some(snapshot.snapshot_id.as_str()))
        .collect();
    batch.sort_by(|a, b| a.1.applied_at.cmp(&b.1.applied_at).then(a.0.cmp(&b.0)));

    for (_, change) in batch {
        let (is_applied, value) = match change.operation {
            Operation::Apply => {
                let value = catalog
                    .get(&change.policy_id)
                    .map(|p| expected_value(&p.mechanism))
                    .or_else(|| change.new_state.clone());
                (true, value)
            }
            Operation::Revert => (false, change.new_state.clone()),
        };
        rows.insert(
            change.policy_id.clone(),
            ExpectedState {
                policy_id: change.policy_id.clone(),
                is_applied,
                value,
            },
        );
    }

    rows.into_values().collect()
}

/// A drift item when the live applied flag disagrees with the expectation.
///
/// Value differences alone are not drift; the applied flag already accounts for the mechanism's
/// own notion of compliance.
pub fn compare(
    expected: &ExpectedState,
    policy_name: &str,
    actual_applied: bool,
    actual_value: Option<String>,
) -> Option<DriftItem> {
    if expected.is_applied == actual_applied {
        return None;
    }
    Some(DriftItem {
        policy_id: expected.policy_id.clone(),
        policy_name: policy_name.to_string(),
        expected_applied: expected.is_applied,
        actual_applied,
        expected_value: expected.value.clone(),
        actual_value,
    })
}
