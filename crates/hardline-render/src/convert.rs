//! Response DTOs to [`RenderableReport`].

use crate::{
    RenderableFinding, RenderableOutcome, RenderableReport, RenderableRow, RenderableSeverity,
};
use hardline_types::{
    ApplyResponse, AuditResponse, DriftResponse, ErrorInfo, RevertResponse, lookup_explanation,
};

fn findings(errors: &[ErrorInfo], warnings: &[ErrorInfo]) -> Vec<RenderableFinding> {
    let convert = |e: &ErrorInfo, severity| RenderableFinding {
        severity,
        code: e.code.clone(),
        policy_id: e.policy_id.as_ref().map(|p| p.as_str().to_string()),
        message: e.message.clone(),
        remediation: lookup_explanation(&e.code).map(|x| first_line(x.remediation)),
    };
    errors
        .iter()
        .map(|e| convert(e, RenderableSeverity::Error))
        .chain(
            warnings
                .iter()
                .map(|w| convert(w, RenderableSeverity::Warning)),
        )
        .collect()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

fn outcome(success: bool, cancelled: bool, progressed: bool) -> RenderableOutcome {
    match (success, cancelled, progressed) {
        (_, true, _) => RenderableOutcome::Cancelled,
        (true, false, _) => RenderableOutcome::Success,
        (false, false, true) => RenderableOutcome::Partial,
        (false, false, false) => RenderableOutcome::Failed,
    }
}

fn pair(label: &str, value: impl ToString) -> (String, String) {
    (label.to_string(), value.to_string())
}

pub fn audit_report(resp: &AuditResponse) -> RenderableReport {
    let s = &resp.summary;
    let rows = resp
        .results
        .iter()
        .map(|r| {
            let status = match (r.applicable, r.is_applied, &r.error) {
                (false, _, _) => "n/a",
                (true, _, Some(_)) => "error",
                (true, Some(true), None) => "applied",
                (true, Some(false), None) => "not applied",
                (true, None, None) => "unknown",
            };
            let detail = match (&r.skip_reason, &r.error) {
                (Some(reason), _) => reason.clone(),
                (None, Some(err)) => err.clone(),
                (None, None) => format!(
                    "current `{}`, expected `{}`{}",
                    r.current_value.as_deref().unwrap_or("?"),
                    r.expected_value,
                    if r.tool_applied { " (applied by hardline)" } else { "" }
                ),
            };
            RenderableRow {
                policy_id: r.policy_id.as_str().to_string(),
                status: status.to_string(),
                detail,
            }
        })
        .collect();

    RenderableReport {
        title: "Hardening audit".to_string(),
        outcome: outcome(resp.success, false, !resp.results.is_empty()),
        summary: vec![
            pair("Build", resp.system.windows_build),
            pair("SKU", &resp.system.sku),
            pair("Policies", s.total),
            pair("Applied", s.applied),
            pair("Not applied", s.not_applied),
            pair("Not applicable", s.not_applicable),
            pair("Errors", s.errors),
        ],
        rows,
        findings: findings(&resp.errors, &resp.warnings),
    }
}

pub fn apply_report(resp: &ApplyResponse) -> RenderableReport {
    let mut rows = Vec::new();
    for id in &resp.planned {
        let status = if resp.applied.contains(id) {
            "applied"
        } else if resp.failed.contains(id) {
            "failed"
        } else if resp.dry_run {
            "planned"
        } else {
            "not attempted"
        };
        let detail = resp
            .changes
            .iter()
            .rev()
            .find(|c| &c.policy_id == id)
            .map(|c| c.description.clone())
            .unwrap_or_default();
        rows.push(RenderableRow {
            policy_id: id.as_str().to_string(),
            status: status.to_string(),
            detail,
        });
    }
    for skipped in &resp.skipped {
        rows.push(RenderableRow {
            policy_id: skipped.policy_id.as_str().to_string(),
            status: "skipped".to_string(),
            detail: skipped.reason.clone(),
        });
    }

    let mut summary = vec![
        pair("Dry run", if resp.dry_run { "yes" } else { "no" }),
        pair("Snapshot", resp.snapshot_id.as_deref().unwrap_or("none")),
    ];
    if let Some(rp) = &resp.restore_point_id {
        summary.push(pair("Restore point", rp));
    }
    summary.push(pair("Applied", resp.applied.len()));
    summary.push(pair("Failed", resp.failed.len()));
    summary.push(pair("Skipped", resp.skipped.len()));

    RenderableReport {
        title: if resp.dry_run {
            "Apply plan".to_string()
        } else {
            "Apply result".to_string()
        },
        outcome: outcome(resp.success, resp.cancelled, !resp.applied.is_empty()),
        summary,
        rows,
        findings: findings(&resp.errors, &resp.warnings),
    }
}

pub fn revert_report(resp: &RevertResponse) -> RenderableReport {
    let rows = resp
        .changes
        .iter()
        .map(|c| RenderableRow {
            policy_id: c.policy_id.as_str().to_string(),
            status: if c.success { "reverted" } else { "failed" }.to_string(),
            detail: c
                .error_message
                .clone()
                .unwrap_or_else(|| c.description.clone()),
        })
        .collect();

    RenderableReport {
        title: "Revert result".to_string(),
        outcome: outcome(resp.success, resp.cancelled, !resp.reverted.is_empty()),
        summary: vec![
            pair("Snapshot", resp.snapshot_id.as_deref().unwrap_or("none")),
            pair("Reverted", resp.reverted.len()),
            pair("Failed", resp.failed.len()),
        ],
        rows,
        findings: findings(&resp.errors, &resp.warnings),
    }
}

pub fn drift_report(resp: &DriftResponse) -> RenderableReport {
    let state = |applied: bool| if applied { "applied" } else { "not applied" };
    let rows = resp
        .drift
        .iter()
        .map(|d| RenderableRow {
            policy_id: d.policy_id.as_str().to_string(),
            status: "drifted".to_string(),
            detail: format!(
                "{}: expected {}, found {} (`{}`)",
                d.policy_name,
                state(d.expected_applied),
                state(d.actual_applied),
                d.actual_value.as_deref().unwrap_or("?")
            ),
        })
        .collect();

    RenderableReport {
        title: "Drift check".to_string(),
        outcome: outcome(resp.success && resp.drift.is_empty(), false, resp.success),
        summary: vec![
            pair("Baseline", resp.snapshot_id.as_deref().unwrap_or("none")),
            pair("Checked", resp.checked),
            pair("Drifted", resp.drift.len()),
        ],
        rows,
        findings: findings(&resp.errors, &resp.warnings),
    }
}
