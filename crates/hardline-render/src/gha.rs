use crate::{RenderableReport, RenderableSeverity};

/// Render findings as GitHub Actions workflow command annotations.
///
/// Format:
/// `::{level} title={policy_id}::[{code}] {message}`
pub fn render_github_annotations(report: &RenderableReport) -> Vec<String> {
    let mut out = Vec::new();

    for f in &report.findings {
        let level = match f.severity {
            RenderableSeverity::Error => "error",
            RenderableSeverity::Warning => "warning",
            RenderableSeverity::Info => "notice",
        };

        let message = escape(&format!("[{}] {}", f.code, f.message));
        match &f.policy_id {
            Some(id) => out.push(format!("::{level} title={}::{message}", escape_property(id))),
            None => out.push(format!("::{level}::{message}")),
        }
    }

    out
}

fn escape(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(text: &str) -> String {
    escape(text).replace(':', "%3A").replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RenderableFinding, RenderableOutcome};

    #[test]
    fn annotations_carry_level_policy_and_escaped_message() {
        let report = RenderableReport {
            title: "Drift check".to_string(),
            outcome: RenderableOutcome::Failed,
            summary: Vec::new(),
            rows: Vec::new(),
            findings: vec![
                RenderableFinding {
                    severity: RenderableSeverity::Error,
                    code: "execution_error".to_string(),
                    policy_id: Some("fw:1,2".to_string()),
                    message: "100% failed\nretry".to_string(),
                    remediation: None,
                },
                RenderableFinding {
                    severity: RenderableSeverity::Warning,
                    code: "persistence_error".to_string(),
                    policy_id: None,
                    message: "not logged".to_string(),
                    remediation: None,
                },
            ],
        };

        assert_eq!(
            render_github_annotations(&report),
            vec![
                "::error title=fw%3A1%2C2::[execution_error] 100%25 failed%0Aretry".to_string(),
                "::warning::[persistence_error] not logged".to_string(),
            ]
        );
    }
}
