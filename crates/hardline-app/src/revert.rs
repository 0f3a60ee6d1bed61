//! The `revert` command.
//!
//! Ordering is a heuristic: most recently applied first. It undoes dependents before their
//! dependencies whenever they were applied in dependency order, which apply guarantees within a
//! batch but not across batches.

use crate::apply::failure_error;
use crate::control::BatchControl;
use crate::engine::PolicyEngine;
use hardline_domain::history::{latest_successful, revert_baseline, tool_applied};
use hardline_types::{
    ChangeRecord, ErrorInfo, Operation, PolicyId, RevertRequest, RevertResponse, RevertSelector,
    ids,
};
use std::collections::{BTreeMap, BTreeSet};

impl PolicyEngine {
    pub fn revert(&self, request: &RevertRequest) -> RevertResponse {
        self.revert_with(request, &BatchControl::default())
    }

    /// Revert with cancellation and progress. Holds the batch lock throughout.
    pub fn revert_with(
        &self,
        request: &RevertRequest,
        control: &BatchControl<'_>,
    ) -> RevertResponse {
        let _batch = self.batch.lock();
        let mut resp = RevertResponse::default();

        if let RevertSelector::RestorePoint { restore_point_id } = &request.selector {
            resp.errors.push(ErrorInfo::new(
                ids::CODE_UNSUPPORTED,
                format!(
                    "rolling back to restore point {restore_point_id} is done through System \
                     Restore, not the engine"
                ),
            ));
            return resp;
        }

        let effective = match self.effective(&BTreeMap::new(), &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };
        let history = match self.change_log.all_changes() {
            Ok(h) => h,
            Err(e) => {
                resp.errors.push(ErrorInfo::new(
                    ids::CODE_PERSISTENCE_ERROR,
                    format!("change history unavailable: {e}"),
                ));
                return resp;
            }
        };

        let targets = match &request.selector {
            RevertSelector::Policies { policy_ids } => {
                policy_targets(&history, policy_ids, &mut resp)
            }
            RevertSelector::Snapshot { snapshot_id } => {
                match self.snapshot_targets(&history, snapshot_id, &mut resp) {
                    Some(t) => t,
                    None => return resp,
                }
            }
            RevertSelector::RestorePoint { .. } => Vec::new(),
        };
        tracing::info!(targets = targets.len(), "revert planned");

        if targets.is_empty() {
            resp.success = resp.errors.is_empty();
            return resp;
        }

        let description = format!("Before reverting {} policies", targets.len());
        if request.create_restore_point {
            resp.restore_point_id = self.restore_point(&description, &mut resp.warnings);
        }
        let (snapshot, _) = self.take_snapshot(
            &effective,
            description,
            resp.restore_point_id.clone(),
            true,
            &mut resp.warnings,
        );
        resp.snapshot_id = Some(snapshot.snapshot_id.clone());

        let total = targets.len();
        for (index, baseline) in targets.iter().enumerate() {
            let id = &baseline.policy_id;
            if control.is_cancelled() {
                tracing::info!(processed = index, total, "revert cancelled");
                resp.cancelled = true;
                resp.errors.push(ErrorInfo::new(
                    ids::CODE_CANCELLED,
                    format!("cancelled after {index} of {total} policies"),
                ));
                break;
            }
            let Some(policy) = effective.catalog.get(id) else {
                resp.errors.push(ErrorInfo::for_policy(
                    ids::CODE_NOT_FOUND,
                    id,
                    format!("policy {id} is no longer in the catalog; cannot revert"),
                ));
                resp.failed.push(id.clone());
                control.report(index + 1, total, id);
                continue;
            };

            let mut record = self.executors.for_policy(policy).revert(policy, baseline);
            record.snapshot_id = Some(snapshot.snapshot_id.clone());
            self.log_change(&record, &mut resp.warnings);
            if record.success {
                tracing::info!(policy_id = %id, "policy reverted");
                resp.reverted.push(id.clone());
            } else {
                resp.errors.push(failure_error(&record));
                resp.failed.push(id.clone());
            }
            resp.changes.push(record);
            control.report(index + 1, total, id);
        }

        resp.success = resp.errors.is_empty();
        resp
    }

    /// For every policy the snapshot's batch applied and that is still applied, the batch's own
    /// first record. Earlier batches stay in place.
    fn snapshot_targets(
        &self,
        history: &[ChangeRecord],
        snapshot_id: &str,
        resp: &mut RevertResponse,
    ) -> Option<Vec<ChangeRecord>> {
        let batch: Vec<&ChangeRecord> = history
            .iter()
            .filter(|c| {
                c.success
                    && c.operation == Operation::Apply
                    && c.snapshot_id.as_deref() == Some(snapshot_id)
            })
            .collect();

        if batch.is_empty() {
            let known = match self.change_log.snapshot(snapshot_id) {
                Ok(s) => s.is_some(),
                Err(e) => {
                    resp.warnings.push(ErrorInfo::new(
                        ids::CODE_PERSISTENCE_ERROR,
                        format!("snapshot lookup failed: {e}"),
                    ));
                    false
                }
            };
            if !known {
                resp.errors.push(ErrorInfo::new(
                    ids::CODE_NOT_FOUND,
                    format!("snapshot {snapshot_id} not found"),
                ));
                return None;
            }
            return Some(Vec::new());
        }

        // The batch's first record per policy holds the state from before that batch.
        let mut earliest: BTreeMap<&PolicyId, &ChangeRecord> = BTreeMap::new();
        for change in &batch {
            earliest.entry(&change.policy_id).or_insert(change);
        }
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for change in batch.iter().rev() {
            let id = &change.policy_id;
            if !seen.insert(id) || !still_applied(history, id, resp) {
                continue;
            }
            if let Some(baseline) = earliest.get(id) {
                targets.push((*baseline).clone());
            }
        }
        Some(targets)
    }
}

/// Baselines for the requested ids, or for every tool-applied policy when none are given.
fn policy_targets(
    history: &[ChangeRecord],
    policy_ids: &[PolicyId],
    resp: &mut RevertResponse,
) -> Vec<ChangeRecord> {
    let mut targets: Vec<(ChangeRecord, ChangeRecord)> = Vec::new();

    if policy_ids.is_empty() {
        for (id, latest) in tool_applied(history) {
            if let Some(baseline) = revert_baseline(history, &id) {
                targets.push((latest.clone(), baseline.clone()));
            }
        }
    } else {
        let mut seen = BTreeSet::new();
        for id in policy_ids {
            if !seen.insert(id) {
                continue;
            }
            let Some(latest) = latest_successful(history, id) else {
                resp.errors.push(ErrorInfo::for_policy(
                    ids::CODE_NOT_FOUND,
                    id,
                    format!("{id} has never been applied"),
                ));
                continue;
            };
            let latest = latest.clone();
            if let Some(baseline) = baseline_or_warn(history, id, resp) {
                targets.push((latest, baseline));
            }
        }
    }

    targets.sort_by(|a, b| b.0.applied_at.cmp(&a.0.applied_at));
    targets.into_iter().map(|(_, baseline)| baseline).collect()
}

fn baseline_or_warn(
    history: &[ChangeRecord],
    policy_id: &PolicyId,
    resp: &mut RevertResponse,
) -> Option<ChangeRecord> {
    if !still_applied(history, policy_id, resp) {
        return None;
    }
    revert_baseline(history, policy_id).cloned()
}

/// False, with an `already_reverted` warning, when the latest change to the policy is a revert.
fn still_applied(
    history: &[ChangeRecord],
    policy_id: &PolicyId,
    resp: &mut RevertResponse,
) -> bool {
    let Some(latest) = latest_successful(history, policy_id) else {
        return false;
    };
    if latest.operation == Operation::Revert {
        resp.warnings.push(ErrorInfo::for_policy(
            ids::CODE_ALREADY_REVERTED,
            policy_id,
            format!("{policy_id} is already reverted; nothing to do"),
        ));
        return false;
    }
    true
}
