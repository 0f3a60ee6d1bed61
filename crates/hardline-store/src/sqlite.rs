use crate::{ChangeLog, StoreError};
use camino::Utf8Path;
use hardline_types::{
    ChangeRecord, FailureKind, Mechanism, Operation, PolicyId, Snapshot, SnapshotPolicyState,
    SystemInfo,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// `MIGRATIONS[n]` upgrades a database from version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE changes (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    change_id       TEXT NOT NULL UNIQUE,
    operation       TEXT NOT NULL,
    policy_id       TEXT NOT NULL,
    mechanism       TEXT NOT NULL,
    applied_at      TEXT NOT NULL,
    applied_at_ns   INTEGER NOT NULL,
    previous_state  TEXT,
    new_state       TEXT,
    success         INTEGER NOT NULL,
    error_message   TEXT,
    failure_kind    TEXT,
    snapshot_id     TEXT,
    description     TEXT NOT NULL
);
CREATE INDEX idx_changes_policy ON changes (policy_id);
CREATE INDEX idx_changes_snapshot ON changes (snapshot_id);

CREATE TABLE snapshots (
    seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id          TEXT NOT NULL UNIQUE,
    description          TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    created_at_ns        INTEGER NOT NULL,
    windows_build        INTEGER NOT NULL,
    sku                  TEXT NOT NULL,
    os_version           TEXT NOT NULL,
    restore_point_id     TEXT,
    catalog_fingerprint  TEXT NOT NULL
);

CREATE TABLE snapshot_states (
    snapshot_id    TEXT NOT NULL REFERENCES snapshots (snapshot_id) ON DELETE CASCADE,
    policy_id      TEXT NOT NULL,
    is_applied     INTEGER NOT NULL,
    current_value  TEXT,
    PRIMARY KEY (snapshot_id, policy_id)
);
"#];

const CHANGE_COLUMNS: &str = "change_id, operation, policy_id, mechanism, applied_at, \
     previous_state, new_state, success, error_message, failure_kind, snapshot_id, description";

const SNAPSHOT_COLUMNS: &str = "snapshot_id, description, created_at, windows_build, sku, \
     os_version, restore_point_id, catalog_fingerprint";

/// SQLite-backed [`ChangeLog`]. One connection, serialized behind a mutex; every write is a
/// transaction.
pub struct SqliteChangeLog {
    conn: Mutex<Connection>,
}

impl SqliteChangeLog {
    /// Open (creating if needed) the database at `path` and bring its schema up to date.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_owned(),
                source,
            })?;
        }
        let conn = Connection::open(path.as_std_path()).map_err(|source| StoreError::Open {
            path: path.to_owned(),
            source,
        })?;
        Self::init(conn, path.as_str())
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(mut conn: Connection, location: &str) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let journal: String =
            conn.query_row("PRAGMA journal_mode = WAL", params![], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&mut conn)?;
        tracing::debug!(location, journal_mode = %journal, "change log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_changes(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        let conn = self.conn.lock();
        let sql =
            format!("SELECT {CHANGE_COLUMNS} FROM changes {filter} ORDER BY applied_at_ns, seq");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, ChangeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ChangeRow::into_record).collect()
    }

    fn query_snapshots(
        &self,
        tail: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots {tail}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, SnapshotRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    fn load_states(&self, snapshot: &mut Snapshot) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT policy_id, is_applied, current_value FROM snapshot_states \
             WHERE snapshot_id = ?1 ORDER BY policy_id",
        )?;
        snapshot.states = stmt
            .query_map(params![snapshot.snapshot_id], |row| {
                Ok(SnapshotPolicyState {
                    policy_id: PolicyId::new(row.get::<_, String>(0)?),
                    is_applied: row.get(1)?,
                    current_value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChangeLog").finish_non_exhaustive()
    }
}

fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }
    let tx = conn.transaction()?;
    for sql in MIGRATIONS.iter().skip(usize::try_from(found).unwrap_or(0)) {
        tx.execute_batch(sql)?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;
    tracing::info!(from = found, to = SCHEMA_VERSION, "change log schema migrated");
    Ok(())
}

fn user_version(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("PRAGMA user_version", params![], |row| row.get(0))?)
}

fn nanos(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos()).unwrap_or(i64::MAX)
}

fn format_time(at: OffsetDateTime, table: &'static str, key: &str) -> Result<String, StoreError> {
    at.format(&Rfc3339).map_err(|e| StoreError::Corrupt {
        table,
        key: key.to_string(),
        message: format!("unformattable timestamp: {e}"),
    })
}

fn parse_time(raw: &str, table: &'static str, key: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| StoreError::Corrupt {
        table,
        key: key.to_string(),
        message: format!("bad timestamp {raw:?}: {e}"),
    })
}

fn insert_states(
    tx: &Transaction<'_>,
    snapshot_id: &str,
    states: &[SnapshotPolicyState],
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(
        "INSERT INTO snapshot_states (snapshot_id, policy_id, is_applied, current_value) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (snapshot_id, policy_id) DO UPDATE SET \
         is_applied = excluded.is_applied, current_value = excluded.current_value",
    )?;
    for state in states {
        stmt.execute(params![
            snapshot_id,
            state.policy_id.as_str(),
            state.is_applied,
            state.current_value
        ])?;
    }
    Ok(())
}

struct ChangeRow {
    change_id: String,
    operation: String,
    policy_id: String,
    mechanism: String,
    applied_at: String,
    previous_state: Option<String>,
    new_state: Option<String>,
    success: bool,
    error_message: Option<String>,
    failure_kind: Option<String>,
    snapshot_id: Option<String>,
    description: String,
}

impl ChangeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            change_id: row.get(0)?,
            operation: row.get(1)?,
            policy_id: row.get(2)?,
            mechanism: row.get(3)?,
            applied_at: row.get(4)?,
            previous_state: row.get(5)?,
            new_state: row.get(6)?,
            success: row.get(7)?,
            error_message: row.get(8)?,
            failure_kind: row.get(9)?,
            snapshot_id: row.get(10)?,
            description: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<ChangeRecord, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            table: "changes",
            key: self.change_id.clone(),
            message,
        };
        let operation = Operation::parse(&self.operation)
            .ok_or_else(|| corrupt(format!("unknown operation {:?}", self.operation)))?;
        let mechanism = Mechanism::parse(&self.mechanism)
            .ok_or_else(|| corrupt(format!("unknown mechanism {:?}", self.mechanism)))?;
        let failure_kind = match self.failure_kind.as_deref() {
            None => None,
            Some(raw) => Some(
                FailureKind::parse(raw)
                    .ok_or_else(|| corrupt(format!("unknown failure kind {raw:?}")))?,
            ),
        };
        let applied_at = parse_time(&self.applied_at, "changes", &self.change_id)?;
        Ok(ChangeRecord {
            change_id: self.change_id,
            operation,
            policy_id: PolicyId::new(self.policy_id),
            mechanism,
            applied_at,
            previous_state: self.previous_state,
            new_state: self.new_state,
            success: self.success,
            error_message: self.error_message,
            failure_kind,
            snapshot_id: self.snapshot_id,
            description: self.description,
        })
    }
}

struct SnapshotRow {
    snapshot_id: String,
    description: String,
    created_at: String,
    windows_build: u32,
    sku: String,
    os_version: String,
    restore_point_id: Option<String>,
    catalog_fingerprint: String,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            snapshot_id: row.get(0)?,
            description: row.get(1)?,
            created_at: row.get(2)?,
            windows_build: row.get(3)?,
            sku: row.get(4)?,
            os_version: row.get(5)?,
            restore_point_id: row.get(6)?,
            catalog_fingerprint: row.get(7)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot, StoreError> {
        let created_at = parse_time(&self.created_at, "snapshots", &self.snapshot_id)?;
        Ok(Snapshot {
            snapshot_id: self.snapshot_id,
            description: self.description,
            created_at,
            system: SystemInfo {
                windows_build: self.windows_build,
                sku: self.sku,
                os_version: self.os_version,
            },
            restore_point_id: self.restore_point_id,
            catalog_fingerprint: self.catalog_fingerprint,
            states: Vec::new(),
        })
    }
}

impl ChangeLog for SqliteChangeLog {
    fn save_changes(&self, changes: &[ChangeRecord]) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO changes (change_id, operation, policy_id, mechanism, applied_at, \
                 applied_at_ns, previous_state, new_state, success, error_message, failure_kind, \
                 snapshot_id, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for c in changes {
                let applied_at = format_time(c.applied_at, "changes", &c.change_id)?;
                stmt.execute(params![
                    c.change_id,
                    c.operation.as_str(),
                    c.policy_id.as_str(),
                    c.mechanism.as_str(),
                    applied_at,
                    nanos(c.applied_at),
                    c.previous_state,
                    c.new_state,
                    c.success,
                    c.error_message,
                    c.failure_kind.map(FailureKind::as_str),
                    c.snapshot_id,
                    c.description,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(count = changes.len(), "changes saved");
        Ok(())
    }

    fn changes_for_policy(&self, policy_id: &PolicyId) -> Result<Vec<ChangeRecord>, StoreError> {
        self.query_changes("WHERE policy_id = ?1", params![policy_id.as_str()])
    }

    fn all_changes(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        self.query_changes("", params![])
    }

    fn changes_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<ChangeRecord>, StoreError> {
        self.query_changes("WHERE snapshot_id = ?1", params![snapshot_id])
    }

    fn create_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let created_at = format_time(snapshot.created_at, "snapshots", &snapshot.snapshot_id)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (snapshot_id, description, created_at, created_at_ns, \
             windows_build, sku, os_version, restore_point_id, catalog_fingerprint) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.snapshot_id,
                snapshot.description,
                created_at,
                nanos(snapshot.created_at),
                snapshot.system.windows_build,
                snapshot.system.sku,
                snapshot.system.os_version,
                snapshot.restore_point_id,
                snapshot.catalog_fingerprint,
            ],
        )?;
        insert_states(&tx, &snapshot.snapshot_id, &snapshot.states)?;
        tx.commit()?;
        tracing::info!(
            snapshot_id = %snapshot.snapshot_id,
            states = snapshot.states.len(),
            "snapshot saved"
        );
        Ok(())
    }

    fn save_snapshot_policy_states(
        &self,
        snapshot_id: &str,
        states: &[SnapshotPolicyState],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE snapshot_id = ?1",
            params![snapshot_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::UnknownSnapshot(snapshot_id.to_string()));
        }
        insert_states(&tx, snapshot_id, states)?;
        tx.commit()?;
        Ok(())
    }

    fn latest_snapshot(&self, include_states: bool) -> Result<Option<Snapshot>, StoreError> {
        let Some(mut snapshot) = self
            .query_snapshots("ORDER BY created_at_ns DESC, seq DESC LIMIT 1", params![])?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        if include_states {
            self.load_states(&mut snapshot)?;
        }
        Ok(Some(snapshot))
    }

    fn snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, StoreError> {
        let found = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE snapshot_id = ?1"),
                params![snapshot_id],
                SnapshotRow::from_row,
            )
            .optional()?
        };
        let Some(row) = found else {
            return Ok(None);
        };
        let mut snapshot = row.into_snapshot()?;
        self.load_states(&mut snapshot)?;
        Ok(Some(snapshot))
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, StoreError> {
        self.query_snapshots("ORDER BY created_at_ns DESC, seq DESC", params![])
    }
}
