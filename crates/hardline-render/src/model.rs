#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderableSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderableOutcome {
    Success,
    Partial,
    Failed,
    Cancelled,
}

/// One `ErrorInfo`, with the explain registry's remediation attached when the code is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderableFinding {
    pub severity: RenderableSeverity,
    pub code: String,
    pub policy_id: Option<String>,
    pub message: String,
    pub remediation: Option<String>,
}

/// One table row: a policy and what happened to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderableRow {
    pub policy_id: String,
    pub status: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderableReport {
    pub title: String,
    pub outcome: RenderableOutcome,
    /// Label/value pairs shown as a bullet list under the title.
    pub summary: Vec<(String, String)>,
    pub rows: Vec<RenderableRow>,
    pub findings: Vec<RenderableFinding>,
}
