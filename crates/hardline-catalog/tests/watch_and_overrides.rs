//! Hot reload and override persistence against a real temp directory.

use camino::{Utf8Path, Utf8PathBuf};
use hardline_catalog::{CatalogCache, CatalogWatcher, DirectorySource, OverrideManager, WatchOptions};
use hardline_types::PolicyId;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path")
}

fn write_policy(root: &Utf8Path, id: &str) {
    let body = format!(
        "policy_id: {id}\nname: Policy {id}\nmechanism:\n  type: registry\n  hive: HKLM\n  key_path: SOFTWARE\\Hardline\n  value_name: {id}\n  expected_value: \"1\"\n"
    );
    std::fs::write(root.join(format!("{id}.yaml")), body).expect("write policy");
}

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn burst_of_edits_triggers_one_debounced_reload() {
    let tmp = TempDir::new().expect("temp dir");
    let root = utf8_root(&tmp);
    write_policy(&root, "p1");

    let cache = Arc::new(CatalogCache::new(Arc::new(
        DirectorySource::new(root.clone(), &[]).expect("source"),
    )));
    assert_eq!(cache.get().expect("initial").catalog.len(), 1);

    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reloads);
    cache.subscribe(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let watched = Arc::clone(&cache);
    let watcher = CatalogWatcher::spawn(
        root.clone(),
        WatchOptions {
            poll_interval: Duration::from_millis(20),
            debounce: Duration::from_millis(150),
        },
        move || watched.invalidate(),
    )
    .expect("spawn watcher");

    for id in ["p2", "p3", "p4"] {
        write_policy(&root, id);
    }

    assert!(
        wait_for(|| reloads.load(Ordering::SeqCst) >= 1, Duration::from_secs(10)),
        "watcher never fired"
    );
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(reloads.load(Ordering::SeqCst), 1, "edits should coalesce");
    assert_eq!(cache.get().expect("reload").catalog.len(), 4);

    watcher.stop();
}

#[test]
fn overrides_merge_write_if_changed_and_remove() {
    let tmp = TempDir::new().expect("temp dir");
    let path = utf8_root(&tmp).join("config").join("overrides.json");
    let manager = OverrideManager::new(path.clone());

    assert!(manager.load_overrides().expect("missing file is empty").is_empty());

    let changed = manager
        .update_overrides(BTreeMap::from([
            (PolicyId::new("tel-001"), json!({"expected_value": "1"})),
            (PolicyId::new("svc-001"), json!({"stop_service": false})),
        ]))
        .expect("update");
    assert!(changed);
    assert!(path.exists());

    let unchanged = manager
        .update_overrides(BTreeMap::from([(
            PolicyId::new("tel-001"),
            json!({"expected_value": "1"}),
        )]))
        .expect("update");
    assert!(!unchanged, "same value should not rewrite the file");

    manager
        .update_overrides(BTreeMap::from([(
            PolicyId::new("tel-001"),
            json!({"expected_value": "3"}),
        )]))
        .expect("update");

    // A second manager sees the persisted state.
    let reopened = OverrideManager::new(path.clone());
    let map = reopened.overrides().expect("read");
    assert_eq!(map.len(), 2);
    assert_eq!(map[&PolicyId::new("tel-001")], json!({"expected_value": "3"}));

    assert!(
        manager
            .remove_overrides(&[PolicyId::new("svc-001"), PolicyId::new("ghost")])
            .expect("remove")
    );
    assert!(!manager.remove_overrides(&[PolicyId::new("ghost")]).expect("remove"));
    let map = reopened.load_overrides().expect("reload");
    assert_eq!(map.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["tel-001"]);
}

#[test]
fn corrupt_override_file_is_an_error() {
    let tmp = TempDir::new().expect("temp dir");
    let path = utf8_root(&tmp).join("overrides.json");
    std::fs::write(&path, "{not json").expect("write");
    let manager = OverrideManager::new(path);
    assert!(manager.overrides().is_err());
}
