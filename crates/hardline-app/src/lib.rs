//! Use case orchestration for hardline.
//!
//! [`PolicyEngine`] is the command surface the UI and CLI collaborators call: list policies,
//! audit, apply, revert, read state, detect drift, and take snapshots. It coordinates the catalog,
//! executors, and change log; the heavy lifting lives in those crates.

#![forbid(unsafe_code)]

mod apply;
mod audit;
mod control;
mod drift;
mod engine;
mod explain;
mod render;
mod revert;

pub use control::{BatchControl, CancellationToken, Progress};
pub use drift::{DriftReport, detect_drift};
pub use engine::{EngineParts, PolicyEngine};
pub use explain::{ExplainOutput, format_explanation, format_not_found, run_explain};
pub use render::{Rendered, render_annotations, render_markdown};
