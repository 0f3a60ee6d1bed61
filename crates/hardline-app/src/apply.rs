//! The `apply` command: resolve, gate, snapshot, execute, log.

use crate::control::BatchControl;
use crate::engine::PolicyEngine;
use hardline_domain::check_compatibility;
use hardline_domain::resolver::{ResolveError, resolve_dependencies};
use hardline_types::{
    ApplyRequest, ApplyResponse, ChangeRecord, ErrorInfo, PolicyId, SkippedPolicy, ids,
};
use std::collections::BTreeSet;

impl PolicyEngine {
    pub fn apply(&self, request: &ApplyRequest) -> ApplyResponse {
        self.apply_with(request, &BatchControl::default())
    }

    /// Apply with cancellation and progress. Holds the batch lock throughout.
    pub fn apply_with(&self, request: &ApplyRequest, control: &BatchControl<'_>) -> ApplyResponse {
        let _batch = self.batch.lock();
        let mut resp = ApplyResponse {
            dry_run: request.dry_run,
            ..ApplyResponse::default()
        };

        let requested = match self.requested_ids(request) {
            Ok(ids) => ids,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };

        let effective = match self.effective(&request.overrides, &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };

        let resolution = match resolve_dependencies(&effective.catalog, &requested) {
            Ok(r) => r,
            Err(ResolveError::Cycle { path }) => {
                resp.errors.push(ErrorInfo::new(
                    ids::CODE_DEPENDENCY_CYCLE,
                    ResolveError::Cycle { path }.to_string(),
                ));
                return resp;
            }
        };
        for id in &resolution.unknown {
            resp.errors.push(ErrorInfo::for_policy(
                ids::CODE_NOT_FOUND,
                id,
                format!("policy {id} is not in the catalog"),
            ));
        }
        for m in &resolution.missing {
            resp.warnings.push(ErrorInfo::for_policy(
                ids::CODE_DEPENDENCY_MISSING,
                &m.policy_id,
                format!(
                    "{} dependency {} is not in the catalog; continuing without it",
                    m.dependency_type.as_str(),
                    m.target
                ),
            ));
        }
        for c in &resolution.conflicts {
            resp.warnings.push(ErrorInfo::for_policy(
                ids::CODE_DEPENDENCY_CONFLICT,
                &c.policy_id,
                format!("conflicts with {}: {}", c.conflicts_with, c.reason),
            ));
        }

        let added: BTreeSet<&PolicyId> = resolution.added.iter().collect();
        for id in &resolution.order {
            let Some(policy) = effective.catalog.get(id) else {
                continue;
            };
            if let Some(reason) = check_compatibility(policy, &effective.system).reason() {
                let message = if added.contains(id) {
                    format!("dependency {id} skipped: {reason}")
                } else {
                    format!("{id} skipped: {reason}")
                };
                resp.warnings
                    .push(ErrorInfo::for_policy(ids::CODE_NOT_APPLICABLE, id, message));
                resp.skipped.push(SkippedPolicy {
                    policy_id: id.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }
            let reversibility = self.executors.for_policy(policy).reversibility(policy);
            if let hardline_exec::Reversibility::Irreversible { reason } = reversibility {
                resp.warnings.push(ErrorInfo::for_policy(
                    ids::CODE_IRREVERSIBLE,
                    id,
                    format!("cannot be reverted once applied: {reason}"),
                ));
            }
            resp.planned.push(id.clone());
        }
        tracing::info!(
            requested = requested.len(),
            planned = resp.planned.len(),
            skipped = resp.skipped.len(),
            dry_run = request.dry_run,
            "apply planned"
        );

        let description = snapshot_description(request, resp.planned.len());
        if request.create_restore_point && !request.dry_run {
            resp.restore_point_id = self.restore_point(&description, &mut resp.warnings);
        }
        let (snapshot, persisted) = self.take_snapshot(
            &effective,
            description,
            resp.restore_point_id.clone(),
            !request.dry_run,
            &mut resp.warnings,
        );
        resp.snapshot_id = Some(snapshot.snapshot_id.clone());
        resp.snapshot_persisted = persisted;

        if request.dry_run {
            resp.success = resp.errors.is_empty();
            return resp;
        }

        let total = resp.planned.len();
        for (index, id) in resp.planned.clone().iter().enumerate() {
            if control.is_cancelled() {
                tracing::info!(processed = index, total, "apply cancelled");
                resp.cancelled = true;
                resp.errors.push(ErrorInfo::new(
                    ids::CODE_CANCELLED,
                    format!("cancelled after {index} of {total} policies"),
                ));
                break;
            }
            let Some(policy) = effective.catalog.get(id) else {
                continue;
            };

            let mut record = self.executors.for_policy(policy).apply(policy);
            record.snapshot_id = Some(snapshot.snapshot_id.clone());
            let ok = record.success;
            self.log_change(&record, &mut resp.warnings);
            if ok {
                tracing::info!(policy_id = %id, mechanism = %record.mechanism, "policy applied");
                resp.applied.push(id.clone());
            } else {
                resp.errors.push(failure_error(&record));
                resp.failed.push(id.clone());
            }
            resp.changes.push(record);
            control.report(index + 1, total, id);

            if !ok && !request.continue_on_error {
                tracing::warn!(policy_id = %id, "halting batch after failure");
                break;
            }
        }

        resp.success = resp.errors.is_empty();
        resp
    }

    fn requested_ids(&self, request: &ApplyRequest) -> Result<Vec<PolicyId>, ErrorInfo> {
        if !request.policy_ids.is_empty() {
            return Ok(request.policy_ids.clone());
        }
        let Some(name) = request.profile_name.as_deref() else {
            return Err(ErrorInfo::new(
                ids::CODE_NOT_FOUND,
                "no policy ids or profile given",
            ));
        };
        match self.settings.profile(name) {
            Some(profile) => Ok(profile.policies.clone()),
            None => Err(ErrorInfo::new(
                ids::CODE_NOT_FOUND,
                format!("profile {name} is not configured"),
            )),
        }
    }

    /// Append one record. A write failure is a warning; the mutation already happened.
    pub(crate) fn log_change(&self, record: &ChangeRecord, warnings: &mut Vec<ErrorInfo>) {
        if let Err(e) = self.change_log.save_changes(std::slice::from_ref(record)) {
            tracing::warn!(policy_id = %record.policy_id, error = %e, "change not logged");
            warnings.push(ErrorInfo::for_policy(
                ids::CODE_PERSISTENCE_ERROR,
                &record.policy_id,
                format!("change {} was made but not logged: {e}", record.change_id),
            ));
        }
    }
}

fn snapshot_description(request: &ApplyRequest, planned: usize) -> String {
    match &request.profile_name {
        Some(profile) => format!("Before applying profile {profile} ({planned} policies)"),
        None => format!("Before applying {planned} policies"),
    }
}

pub(crate) fn failure_error(record: &ChangeRecord) -> ErrorInfo {
    let code = record
        .failure_kind
        .map_or(ids::CODE_EXECUTION_ERROR, |k| k.error_code());
    ErrorInfo::for_policy(
        code,
        &record.policy_id,
        record
            .error_message
            .clone()
            .unwrap_or_else(|| record.description.clone()),
    )
}
