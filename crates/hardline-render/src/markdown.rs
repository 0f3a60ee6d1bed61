use crate::{RenderableOutcome, RenderableReport, RenderableSeverity};

/// Cells may not contain raw pipes or line breaks.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_markdown(report: &RenderableReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", report.title));
    let outcome = match report.outcome {
        RenderableOutcome::Success => "SUCCESS",
        RenderableOutcome::Partial => "PARTIAL",
        RenderableOutcome::Failed => "FAILED",
        RenderableOutcome::Cancelled => "CANCELLED",
    };
    out.push_str(&format!("- Outcome: **{outcome}**\n"));
    for (label, value) in &report.summary {
        out.push_str(&format!("- {label}: {value}\n"));
    }
    out.push('\n');

    if !report.rows.is_empty() {
        out.push_str("| Policy | Status | Detail |\n");
        out.push_str("|---|---|---|\n");
        for row in &report.rows {
            out.push_str(&format!(
                "| `{}` | {} | {} |\n",
                row.policy_id,
                cell(&row.status),
                cell(&row.detail)
            ));
        }
        out.push('\n');
    }

    if report.findings.is_empty() {
        out.push_str("No errors or warnings.\n");
        return out;
    }

    out.push_str("## Errors and warnings\n\n");
    for f in &report.findings {
        let sev = match f.severity {
            RenderableSeverity::Info => "INFO",
            RenderableSeverity::Warning => "WARN",
            RenderableSeverity::Error => "ERROR",
        };
        match &f.policy_id {
            Some(id) => out.push_str(&format!("- [{sev}] `{}` `{id}`: {}\n", f.code, f.message)),
            None => out.push_str(&format!("- [{sev}] `{}`: {}\n", f.code, f.message)),
        }
        if let Some(fix) = &f.remediation {
            out.push_str(&format!("  - fix: {fix}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RenderableFinding, RenderableRow};

    fn report(findings: Vec<RenderableFinding>) -> RenderableReport {
        RenderableReport {
            title: "Apply result".to_string(),
            outcome: RenderableOutcome::Partial,
            summary: vec![("Applied".to_string(), "1".to_string())],
            rows: vec![RenderableRow {
                policy_id: "svc-001".to_string(),
                status: "failed".to_string(),
                detail: "sc config | exit 5\nline two".to_string(),
            }],
            findings,
        }
    }

    #[test]
    fn renders_report_without_findings() {
        let md = render_markdown(&report(Vec::new()));
        insta::assert_snapshot!(md, @r"
        # Apply result

        - Outcome: **PARTIAL**
        - Applied: 1

        | Policy | Status | Detail |
        |---|---|---|
        | `svc-001` | failed | sc config \| exit 5 line two |

        No errors or warnings.
        ");
    }

    #[test]
    fn renders_findings_with_policy_and_fix() {
        let md = render_markdown(&report(vec![
            RenderableFinding {
                severity: RenderableSeverity::Error,
                code: "authorization_error".to_string(),
                policy_id: Some("svc-001".to_string()),
                message: "access denied: DiagTrack".to_string(),
                remediation: Some("Run elevated.".to_string()),
            },
            RenderableFinding {
                severity: RenderableSeverity::Info,
                code: "note".to_string(),
                policy_id: None,
                message: "done".to_string(),
                remediation: None,
            },
        ]));
        assert!(md.contains("## Errors and warnings"));
        assert!(md.contains("- [ERROR] `authorization_error` `svc-001`: access denied: DiagTrack"));
        assert!(md.contains("  - fix: Run elevated."));
        assert!(md.contains("- [INFO] `note`: done"));
    }
}
