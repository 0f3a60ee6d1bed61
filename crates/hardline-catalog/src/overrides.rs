//! Persisted policy overrides: one JSON object mapping policy id to a mechanism-details fragment.
//!
//! Every operation is a full read-modify-write under one mutex. The file is small and rarely
//! written.

use crate::CatalogError;
use camino::{Utf8Path, Utf8PathBuf};
use hardline_types::PolicyId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

pub type OverrideMap = BTreeMap<PolicyId, Value>;

#[derive(Debug)]
pub struct OverrideManager {
    path: Utf8PathBuf,
    loaded: Mutex<Option<OverrideMap>>,
}

impl OverrideManager {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Re-read the file. A missing file is an empty map.
    pub fn load_overrides(&self) -> Result<OverrideMap, CatalogError> {
        let mut guard = self.loaded.lock();
        let map = read_file(&self.path)?;
        *guard = Some(map.clone());
        Ok(map)
    }

    /// Current overrides, reading the file on first use.
    pub fn overrides(&self) -> Result<OverrideMap, CatalogError> {
        let mut guard = self.loaded.lock();
        if let Some(map) = guard.as_ref() {
            return Ok(map.clone());
        }
        let map = read_file(&self.path)?;
        *guard = Some(map.clone());
        Ok(map)
    }

    /// Merge `updates` over the stored map (last write wins per id).
    ///
    /// Returns whether anything changed; the file is only rewritten when it did.
    pub fn update_overrides(&self, updates: OverrideMap) -> Result<bool, CatalogError> {
        self.modify(|map| {
            for (id, fragment) in updates {
                map.insert(id, fragment);
            }
        })
    }

    pub fn remove_overrides(&self, ids: &[PolicyId]) -> Result<bool, CatalogError> {
        self.modify(|map| {
            for id in ids {
                map.remove(id);
            }
        })
    }

    fn modify(&self, edit: impl FnOnce(&mut OverrideMap)) -> Result<bool, CatalogError> {
        let mut guard = self.loaded.lock();
        let current = read_file(&self.path)?;
        let mut next = current.clone();
        edit(&mut next);

        if next == current {
            *guard = Some(current);
            return Ok(false);
        }

        write_atomic(&self.path, &next)?;
        tracing::info!(path = %self.path, entries = next.len(), "overrides written");
        *guard = Some(next);
        Ok(true)
    }
}

fn read_file(path: &Utf8Path) -> Result<OverrideMap, CatalogError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OverrideMap::new()),
        Err(source) => {
            return Err(CatalogError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        return Ok(OverrideMap::new());
    }
    serde_json::from_str(&text).map_err(|source| CatalogError::OverrideParse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Utf8Path, map: &OverrideMap) -> Result<(), CatalogError> {
    let write_err = |source| CatalogError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut body = serde_json::to_string_pretty(map).map_err(CatalogError::OverrideSerialize)?;
    body.push('\n');

    let tmp = path.with_extension("json.tmp");
    let written = std::fs::write(&tmp, body).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(source) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let tmp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp dir");
        // A directory at the target path makes the final rename fail.
        let path = root.join("overrides.json");
        std::fs::create_dir(&path).expect("mkdir");

        let map = OverrideMap::from([(PolicyId::new("tel-001"), json!({"expected_value": "1"}))]);
        let err = write_atomic(&path, &map).expect_err("rename onto a directory");

        assert!(matches!(err, CatalogError::Write { .. }), "{err:?}");
        assert!(!root.join("overrides.json.tmp").exists());
        assert!(path.is_dir());
    }
}
