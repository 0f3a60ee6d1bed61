//! Derivations over the change log.
//!
//! "Is this policy applied by us" is never stored; it is recomputed from the records each time.
//! The only signal is [`Operation`]. Descriptions are never inspected.

use hardline_types::{ChangeRecord, Operation, PolicyId};
use std::collections::BTreeMap;

/// Successful records for `policy_id`, oldest first. Equal timestamps keep log order.
fn successful_for<'a>(changes: &'a [ChangeRecord], policy_id: &PolicyId) -> Vec<&'a ChangeRecord> {
    let mut out: Vec<(usize, &ChangeRecord)> = changes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.success && &c.policy_id == policy_id)
        .collect();
    out.sort_by(|a, b| a.1.applied_at.cmp(&b.1.applied_at).then(a.0.cmp(&b.0)));
    out.into_iter().map(|(_, c)| c).collect()
}

/// Latest successful change for a policy, or `None` if it has never been changed successfully.
pub fn latest_successful<'a>(
    changes: &'a [ChangeRecord],
    policy_id: &PolicyId,
) -> Option<&'a ChangeRecord> {
    successful_for(changes, policy_id).pop()
}

pub fn is_tool_applied(changes: &[ChangeRecord], policy_id: &PolicyId) -> bool {
    latest_successful(changes, policy_id).is_some_and(|c| c.operation == Operation::Apply)
}

/// Every policy whose latest successful change is an apply, mapped to that change.
pub fn tool_applied(changes: &[ChangeRecord]) -> BTreeMap<PolicyId, &ChangeRecord> {
    let mut latest: BTreeMap<PolicyId, (usize, &ChangeRecord)> = BTreeMap::new();
    for (idx, change) in changes.iter().enumerate() {
        if !change.success {
            continue;
        }
        let replace = match latest.get(&change.policy_id) {
            None => true,
            Some((prev_idx, prev)) => {
                (change.applied_at, idx) > (prev.applied_at, *prev_idx)
            }
        };
        if replace {
            latest.insert(change.policy_id.clone(), (idx, change));
        }
    }
    latest
        .into_iter()
        .filter(|(_, (_, c))| c.operation == Operation::Apply)
        .map(|(id, (_, c))| (id, c))
        .collect()
}

/// The apply whose `previous_state` a revert should restore.
///
/// That is the first successful apply after the last successful revert, so applying twice in a row
/// still restores the state from before the first apply.
pub fn revert_baseline<'a>(
    changes: &'a [ChangeRecord],
    policy_id: &PolicyId,
) -> Option<&'a ChangeRecord> {
    let history = successful_for(changes, policy_id);
    let after_last_revert = history
        .iter()
        .rposition(|c| c.operation == Operation::Revert)
        .map_or(0, |i| i + 1);
    history[after_last_revert..]
        .iter()
        .find(|c| c.operation == Operation::Apply)
        .copied()
}
