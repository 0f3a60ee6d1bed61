//! Change log and snapshot persistence.
//!
//! [`ChangeLog`] is the seam the engine writes through. [`SqliteChangeLog`] is the durable
//! implementation; [`MemoryChangeLog`] backs dry environments and tests, and can be told to fail
//! so callers' degraded paths are testable.

#![forbid(unsafe_code)]

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryChangeLog;
pub use sqlite::SqliteChangeLog;

use hardline_types::{ChangeRecord, PolicyId, Snapshot, SnapshotPolicyState};

/// Append-only record of changes plus the snapshots that group them.
///
/// Change listings are ordered by `applied_at`, ties broken by insertion order. Snapshot listings
/// are newest first.
pub trait ChangeLog: Send + Sync {
    /// Append all of `changes` atomically.
    fn save_changes(&self, changes: &[ChangeRecord]) -> Result<(), StoreError>;

    fn changes_for_policy(&self, policy_id: &PolicyId) -> Result<Vec<ChangeRecord>, StoreError>;

    fn all_changes(&self) -> Result<Vec<ChangeRecord>, StoreError>;

    fn changes_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<ChangeRecord>, StoreError>;

    /// Persist the snapshot header together with its states.
    fn create_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Add or replace state rows of an existing snapshot.
    fn save_snapshot_policy_states(
        &self,
        snapshot_id: &str,
        states: &[SnapshotPolicyState],
    ) -> Result<(), StoreError>;

    /// Newest snapshot; `states` is left empty unless `include_states`.
    fn latest_snapshot(&self, include_states: bool) -> Result<Option<Snapshot>, StoreError>;

    /// Snapshot with its states.
    fn snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Snapshot headers (no states), newest first.
    fn list_snapshots(&self) -> Result<Vec<Snapshot>, StoreError>;
}
