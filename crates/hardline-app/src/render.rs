//! Render use cases: Markdown and GitHub annotations for command responses.

use hardline_render::RenderableReport;
use hardline_types::{ApplyResponse, AuditResponse, DriftResponse, RevertResponse};

/// A response that has a human-readable rendering.
#[derive(Clone, Copy, Debug)]
pub enum Rendered<'a> {
    Audit(&'a AuditResponse),
    Apply(&'a ApplyResponse),
    Revert(&'a RevertResponse),
    Drift(&'a DriftResponse),
}

impl Rendered<'_> {
    fn report(self) -> RenderableReport {
        match self {
            Rendered::Audit(r) => hardline_render::audit_report(r),
            Rendered::Apply(r) => hardline_render::apply_report(r),
            Rendered::Revert(r) => hardline_render::revert_report(r),
            Rendered::Drift(r) => hardline_render::drift_report(r),
        }
    }
}

pub fn render_markdown(response: Rendered<'_>) -> String {
    hardline_render::render_markdown(&response.report())
}

pub fn render_annotations(response: Rendered<'_>, max: usize) -> Vec<String> {
    hardline_render::render_github_annotations(&response.report())
        .into_iter()
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_types::{ErrorInfo, ids};

    fn noisy_drift() -> DriftResponse {
        DriftResponse {
            success: true,
            warnings: vec![
                ErrorInfo::new(ids::CODE_NOT_FOUND, "one"),
                ErrorInfo::new(ids::CODE_NOT_FOUND, "two"),
            ],
            ..DriftResponse::default()
        }
    }

    #[test]
    fn render_annotations_respects_max() {
        let drift = noisy_drift();
        assert_eq!(render_annotations(Rendered::Drift(&drift), 1).len(), 1);
    }

    #[test]
    fn render_markdown_smoke() {
        let drift = noisy_drift();
        let markdown = render_markdown(Rendered::Drift(&drift));
        assert!(markdown.starts_with("# Drift check"));
    }
}
