//! Deterministic renderers for hardline responses (Markdown, GitHub annotations).
//!
//! Responses are first flattened into a [`RenderableReport`]; every renderer works from that.

#![forbid(unsafe_code)]

mod convert;
mod gha;
mod markdown;
mod model;

pub use convert::{apply_report, audit_report, drift_report, revert_report};
pub use gha::render_github_annotations;
pub use markdown::render_markdown;
pub use model::{
    RenderableFinding, RenderableOutcome, RenderableReport, RenderableRow, RenderableSeverity,
};
