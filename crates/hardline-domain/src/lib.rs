//! Pure policy logic for hardline.
//!
//! Everything here is deterministic and free of IO: callers hand in parsed definitions, change
//! records and probe results, and get back catalogs, plans, and derived state.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod compat;
pub mod drift;
pub mod expected;
pub mod history;
pub mod overrides;
pub mod resolver;
pub mod state_kv;
pub mod validate;

#[cfg(test)]
mod proptest;

pub use catalog::Catalog;
pub use compat::{Compatibility, check_compatibility};
pub use drift::ExpectedState;
pub use overrides::{OverrideError, apply_overrides, merge_override};
pub use resolver::{
    ConflictPair, GraphError, GraphReport, MissingDependency, Resolution, ResolveError,
    render_chain, resolve_dependencies, validate_graph,
};
pub use validate::{ValidationError, ValidationIssue, build_catalog};
