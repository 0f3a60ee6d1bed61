//! Stable codes carried in `ErrorInfo.code`.
//!
//! Codes are short snake_case discriminators. They are part of the external contract: the UI maps
//! them to flows (e.g. `authorization_error` triggers elevation), so never rename one.

// Catalog
pub const CODE_VALIDATION_ERROR: &str = "validation_error";
pub const CODE_GRAPH_ERROR: &str = "graph_error";
pub const CODE_CATALOG_ERROR: &str = "catalog_error";
pub const CODE_OVERRIDE_INVALID: &str = "override_invalid";

// Gating and ordering
pub const CODE_NOT_APPLICABLE: &str = "not_applicable";
pub const CODE_DEPENDENCY_CYCLE: &str = "dependency_cycle";
pub const CODE_DEPENDENCY_MISSING: &str = "dependency_missing";
pub const CODE_DEPENDENCY_CONFLICT: &str = "dependency_conflict";

// Execution
pub const CODE_EXECUTION_ERROR: &str = "execution_error";
pub const CODE_AUTHORIZATION_ERROR: &str = "authorization_error";
pub const CODE_IRREVERSIBLE: &str = "irreversible";
pub const CODE_CANCELLED: &str = "cancelled";
pub const CODE_ALREADY_REVERTED: &str = "already_reverted";

// History and safety net
pub const CODE_PERSISTENCE_ERROR: &str = "persistence_error";
pub const CODE_NOT_FOUND: &str = "not_found";
pub const CODE_NO_SNAPSHOT: &str = "no_snapshot";
pub const CODE_RESTORE_POINT_FAILED: &str = "restore_point_failed";
pub const CODE_UNSUPPORTED: &str = "unsupported";

/// Snapshot id prefix used when a snapshot could not be persisted.
pub const UNPERSISTED_SNAPSHOT_PREFIX: &str = "mem-";
