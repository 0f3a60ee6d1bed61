use crate::{ChangeLog, StoreError};
use hardline_types::{ChangeRecord, PolicyId, Snapshot, SnapshotPolicyState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Inner {
    changes: Vec<ChangeRecord>,
    snapshots: Vec<Snapshot>,
}

/// In-process [`ChangeLog`]. Writes can be switched off with [`MemoryChangeLog::fail_writes`].
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns [`StoreError::Unavailable`]; reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn sorted(mut changes: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
        changes.sort_by_key(|c| c.applied_at);
        changes
    }

    fn newest_first(&self) -> Vec<Snapshot> {
        let inner = self.inner.lock();
        let mut snapshots: Vec<Snapshot> = inner.snapshots.iter().rev().cloned().collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }
}

impl ChangeLog for MemoryChangeLog {
    fn save_changes(&self, changes: &[ChangeRecord]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.lock().changes.extend_from_slice(changes);
        Ok(())
    }

    fn changes_for_policy(&self, policy_id: &PolicyId) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(Self::sorted(
            inner
                .changes
                .iter()
                .filter(|c| &c.policy_id == policy_id)
                .cloned()
                .collect(),
        ))
    }

    fn all_changes(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        Ok(Self::sorted(self.inner.lock().changes.clone()))
    }

    fn changes_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(Self::sorted(
            inner
                .changes
                .iter()
                .filter(|c| c.snapshot_id.as_deref() == Some(snapshot_id))
                .cloned()
                .collect(),
        ))
    }

    fn create_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut snapshot = snapshot.clone();
        snapshot.states.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
        self.inner.lock().snapshots.push(snapshot);
        Ok(())
    }

    fn save_snapshot_policy_states(
        &self,
        snapshot_id: &str,
        states: &[SnapshotPolicyState],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        let snapshot = inner
            .snapshots
            .iter_mut()
            .find(|s| s.snapshot_id == snapshot_id)
            .ok_or_else(|| StoreError::UnknownSnapshot(snapshot_id.to_string()))?;
        for state in states {
            match snapshot
                .states
                .iter_mut()
                .find(|s| s.policy_id == state.policy_id)
            {
                Some(existing) => *existing = state.clone(),
                None => snapshot.states.push(state.clone()),
            }
        }
        snapshot.states.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
        Ok(())
    }

    fn latest_snapshot(&self, include_states: bool) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.newest_first().into_iter().next().map(|mut s| {
            if !include_states {
                s.states.clear();
            }
            s
        }))
    }

    fn snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .inner
            .lock()
            .snapshots
            .iter()
            .find(|s| s.snapshot_id == snapshot_id)
            .cloned())
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, StoreError> {
        Ok(self
            .newest_first()
            .into_iter()
            .map(|mut s| {
                s.states.clear();
                s
            })
            .collect())
    }
}
