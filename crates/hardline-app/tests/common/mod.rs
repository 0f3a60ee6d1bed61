//! Engine wired to in-memory hosts, store, and catalog.

#![allow(dead_code)]

use camino::Utf8PathBuf;
use hardline_app::{EngineParts, PolicyEngine};
use hardline_catalog::{DirectorySource, PolicySource, StaticSource};
use hardline_exec::memory::{MemoryHost, MemoryRestorePoints};
use hardline_exec::{RegistryValue, StaticSystemInfo};
use hardline_settings::EngineSettings;
use hardline_store::MemoryChangeLog;
use hardline_test_util::policies::TEST_KEY_PATH;
use hardline_types::{PolicyDefinition, RegistryHive, RegistryValueType};
use std::sync::Arc;

pub const BUILD: u32 = 22631;
pub const SKU: &str = "Professional";

pub struct Harness {
    pub engine: PolicyEngine,
    pub host: MemoryHost,
    pub log: Arc<MemoryChangeLog>,
    pub restore_points: Arc<MemoryRestorePoints>,
    pub dir: tempfile::TempDir,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn settings_in(dir: &tempfile::TempDir) -> EngineSettings {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    EngineSettings::rooted_at(&root)
}

pub fn harness(policies: Vec<PolicyDefinition>) -> Harness {
    harness_from(Arc::new(StaticSource::new(policies)), |_| {})
}

pub fn harness_from(
    source: Arc<dyn PolicySource>,
    configure: impl FnOnce(&mut EngineSettings),
) -> Harness {
    init_tracing();
    let dir = tempfile::TempDir::new().expect("temp dir");
    let mut settings = settings_in(&dir);
    configure(&mut settings);

    let host = MemoryHost::new();
    let log = Arc::new(MemoryChangeLog::new());
    let restore_points = Arc::new(MemoryRestorePoints::default());
    let engine = PolicyEngine::from_parts(EngineParts {
        settings,
        source,
        change_log: log.clone(),
        hosts: host.hosts(),
        restore_points: restore_points.clone(),
        system: Arc::new(StaticSystemInfo::new(BUILD, SKU)),
    })
    .expect("engine");

    Harness {
        engine,
        host,
        log,
        restore_points,
        dir,
    }
}

/// Repo root / tests / fixtures.
pub fn fixtures_dir() -> Utf8PathBuf {
    let manifest = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest
        .parent()
        .and_then(|p| p.parent())
        .expect("repo root")
        .join("tests")
        .join("fixtures")
}

pub fn fixture_harness() -> Harness {
    let source = DirectorySource::new(fixtures_dir().join("policies"), &[]).expect("source");
    harness_from(Arc::new(source), |_| {})
}

pub fn dword(data: &str) -> RegistryValue {
    RegistryValue {
        value_type: RegistryValueType::Dword,
        data: data.to_string(),
    }
}

/// Value under the registry builders' test key, if present.
pub fn test_value(host: &MemoryHost, name: &str) -> Option<String> {
    host.registry
        .value(RegistryHive::LocalMachine, TEST_KEY_PATH, name)
        .map(|v| v.data)
}

pub fn set_test_value(host: &MemoryHost, name: &str, data: &str) {
    host.registry
        .insert(RegistryHive::LocalMachine, TEST_KEY_PATH, name, dword(data));
}
