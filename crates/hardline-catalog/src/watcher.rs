//! Polling watcher for the policy tree.
//!
//! The tree is fingerprinted (relative path, size, mtime) on every poll. A change arms a debounce
//! timer; the callback fires once the fingerprint has been stable for the whole window, so a burst
//! of saves produces a single reload.

use crate::discover::POLICY_EXTENSIONS;
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, UNIX_EPOCH};
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            debounce: Duration::from_millis(500),
        }
    }
}

/// SHA-256 over every policy document's relative path, size, and mtime. Missing roots hash as
/// empty, so deleting and recreating the directory is seen as a change.
pub fn tree_fingerprint(root: &Utf8Path) -> String {
    let mut entries: Vec<(String, u64, u128)> = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_policy = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| POLICY_EXTENSIONS.iter().any(|k| ext.eq_ignore_ascii_case(k)));
        if !is_policy {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        let rel = path
            .strip_prefix(root.as_std_path())
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        entries.push((rel, meta.len(), mtime));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (rel, len, mtime) in &entries {
        hasher.update(rel.as_bytes());
        hasher.update(len.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Background poller. Stops and joins its thread on drop.
pub struct CatalogWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CatalogWatcher {
    pub fn spawn<F>(root: Utf8PathBuf, options: WatchOptions, on_change: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let baseline = tree_fingerprint(&root);

        let handle = std::thread::Builder::new()
            .name("hardline-catalog-watch".to_string())
            .spawn(move || {
                let mut last = baseline;
                let mut pending_since: Option<Instant> = None;

                while !stop_flag.load(Ordering::SeqCst) {
                    std::thread::sleep(options.poll_interval);
                    let now = tree_fingerprint(&root);
                    if now != last {
                        last = now;
                        pending_since = Some(Instant::now());
                        continue;
                    }
                    if let Some(since) = pending_since
                        && since.elapsed() >= options.debounce
                    {
                        pending_since = None;
                        tracing::info!(root = %root, "policy tree changed");
                        on_change();
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("catalog watcher thread panicked");
        }
    }
}

impl Drop for CatalogWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CatalogWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogWatcher")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fingerprint_tracks_policy_files_only() {
        let tmp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let empty = tree_fingerprint(&root);

        std::fs::write(root.join("notes.txt"), "x").expect("write");
        assert_eq!(tree_fingerprint(&root), empty);

        std::fs::write(root.join("p.yaml"), "policy_id: p").expect("write");
        let one = tree_fingerprint(&root);
        assert_ne!(one, empty);

        std::fs::write(root.join("p.yaml"), "policy_id: p\nname: longer").expect("write");
        assert_ne!(tree_fingerprint(&root), one);
    }
}
