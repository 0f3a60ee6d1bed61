//! Read-only commands: audit, state, and drift.

use crate::drift::detect_drift;
use crate::engine::PolicyEngine;
use hardline_domain::check_compatibility;
use hardline_domain::drift::expected_states;
use hardline_domain::expected::expected_value;
use hardline_domain::history::tool_applied;
use hardline_types::{
    AppliedPolicy, AuditResponse, AuditResult, AuditSummary, ChangeRecord, DriftResponse,
    ErrorInfo, PolicyDefinition, PolicyId, StateResponse, ids,
};
use std::collections::BTreeMap;

impl PolicyEngine {
    /// Probe every policy, or only `policy_ids` when given. Never mutates the host.
    pub fn audit(&self, policy_ids: Option<&[PolicyId]>) -> AuditResponse {
        let mut resp = AuditResponse::default();
        let effective = match self.effective(&BTreeMap::new(), &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };
        resp.system = effective.system.clone();

        let history = self.history_or_warn(&mut resp.warnings);
        let applied_by_tool = tool_applied(&history);

        let selected: Vec<&PolicyDefinition> = match policy_ids {
            None => effective.catalog.iter().collect(),
            Some(requested) => requested
                .iter()
                .filter_map(|id| {
                    let found = effective.catalog.get(id);
                    if found.is_none() {
                        resp.errors.push(ErrorInfo::for_policy(
                            ids::CODE_NOT_FOUND,
                            id,
                            format!("policy {id} is not in the catalog"),
                        ));
                    }
                    found
                })
                .collect(),
        };

        for policy in selected {
            let mut result = AuditResult {
                policy_id: policy.policy_id.clone(),
                name: policy.name.clone(),
                category: policy.category.clone(),
                mechanism: policy.mechanism_kind(),
                risk_level: policy.risk_level,
                applicable: true,
                skip_reason: None,
                is_applied: None,
                current_value: None,
                expected_value: expected_value(&policy.mechanism),
                tool_applied: applied_by_tool.contains_key(&policy.policy_id),
                error: None,
            };

            if let Some(reason) = check_compatibility(policy, &effective.system).reason() {
                result.applicable = false;
                result.skip_reason = Some(reason.to_string());
                resp.results.push(result);
                continue;
            }

            let exec = self.executors.for_policy(policy);
            match exec.is_applied(policy) {
                Ok(applied) => result.is_applied = Some(applied),
                Err(e) => {
                    tracing::warn!(policy_id = %policy.policy_id, error = %e, "audit probe failed");
                    result.error = Some(e.to_string());
                }
            }
            match exec.current_value(policy) {
                Ok(value) => result.current_value = Some(value),
                Err(e) if result.error.is_none() => result.error = Some(e.to_string()),
                Err(_) => {}
            }
            resp.results.push(result);
        }

        resp.summary = AuditSummary::from_results(&resp.results);
        tracing::info!(
            total = resp.summary.total,
            applied = resp.summary.applied,
            errors = resp.summary.errors,
            "audit complete"
        );
        resp.success = resp.errors.is_empty();
        resp
    }

    /// Latest snapshot, tool-applied policies, and optionally every snapshot and change.
    pub fn get_state(&self, include_history: bool) -> StateResponse {
        let mut resp = StateResponse {
            system: self.system.system_info(),
            ..StateResponse::default()
        };

        match self.change_log.latest_snapshot(true) {
            Ok(s) => resp.latest_snapshot = s,
            Err(e) => resp.errors.push(persistence("latest snapshot unavailable", e)),
        }

        let history = match self.change_log.all_changes() {
            Ok(h) => h,
            Err(e) => {
                resp.errors.push(persistence("change history unavailable", e));
                Vec::new()
            }
        };
        let mut applied: Vec<AppliedPolicy> = tool_applied(&history)
            .into_iter()
            .map(|(policy_id, change)| AppliedPolicy {
                policy_id,
                change_id: change.change_id.clone(),
                applied_at: change.applied_at,
            })
            .collect();
        applied.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        resp.tool_applied = applied;

        if include_history {
            match self.change_log.list_snapshots() {
                Ok(s) => resp.snapshots = s,
                Err(e) => resp.errors.push(persistence("snapshot list unavailable", e)),
            }
            resp.history = history;
        }

        resp.success = resp.errors.is_empty();
        resp
    }

    /// Compare a snapshot's expected states with the live host. Defaults to the latest snapshot.
    pub fn detect_drift(&self, snapshot_id: Option<&str>) -> DriftResponse {
        let mut resp = DriftResponse::default();

        let snapshot = match snapshot_id {
            Some(id) => self.change_log.snapshot(id),
            None => self.change_log.latest_snapshot(true),
        };
        let snapshot = match snapshot {
            Ok(Some(s)) => s,
            Ok(None) => {
                let message = match snapshot_id {
                    Some(id) => format!("snapshot {id} not found"),
                    None => "no snapshot has been taken yet".to_string(),
                };
                resp.errors.push(ErrorInfo::new(ids::CODE_NO_SNAPSHOT, message));
                return resp;
            }
            Err(e) => {
                resp.errors.push(persistence("snapshot unavailable", e));
                return resp;
            }
        };
        resp.snapshot_id = Some(snapshot.snapshot_id.clone());

        let effective = match self.effective(&BTreeMap::new(), &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };
        let history = self.history_or_warn(&mut resp.warnings);

        let expected = expected_states(&snapshot, &history, &effective.catalog);
        let report = detect_drift(
            &expected,
            &effective.catalog,
            &effective.system,
            &self.executors,
        );
        resp.checked = report.checked;
        resp.drift = report.items;
        resp.warnings.extend(report.warnings);
        tracing::info!(
            snapshot_id = %snapshot.snapshot_id,
            checked = resp.checked,
            drifted = resp.drift.len(),
            "drift check complete"
        );
        resp.success = resp.errors.is_empty();
        resp
    }

    fn history_or_warn(&self, warnings: &mut Vec<ErrorInfo>) -> Vec<ChangeRecord> {
        self.change_log.all_changes().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "change history unavailable");
            warnings.push(persistence("change history unavailable", e));
            Vec::new()
        })
    }
}

fn persistence(context: &str, e: hardline_store::StoreError) -> ErrorInfo {
    ErrorInfo::new(ids::CODE_PERSISTENCE_ERROR, format!("{context}: {e}"))
}
