//! The policy engine: owns the catalog cache, executors, change log, and batch lock.
//!
//! Commands never return `Err`; every failure lands in the response's `errors` or `warnings`.
//! Only [`PolicyEngine::open`] and [`PolicyEngine::from_parts`] can fail, and only fatally.

use anyhow::Context;
use hardline_catalog::{
    CatalogCache, CatalogError, CatalogWatcher, DirectorySource, LoadedCatalog, OverrideManager,
    PolicySource, WatchOptions,
};
use hardline_domain::overrides::layer_overrides;
use hardline_domain::{Catalog, apply_overrides, check_compatibility};
use hardline_exec::{ExecutorSet, Hosts, RestorePointManager, SystemInfoProvider};
use hardline_settings::EngineSettings;
use hardline_store::{ChangeLog, SqliteChangeLog};
use hardline_types::{
    ApplyRequest, ErrorInfo, PoliciesResponse, PolicyDefinition, PolicyId, Snapshot,
    SnapshotPolicyState, SnapshotResponse, SystemInfo, ids,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Everything the engine talks to. [`PolicyEngine::open`] builds the production set.
pub struct EngineParts {
    pub settings: EngineSettings,
    pub source: Arc<dyn PolicySource>,
    pub change_log: Arc<dyn ChangeLog>,
    pub hosts: Hosts,
    pub restore_points: Arc<dyn RestorePointManager>,
    pub system: Arc<dyn SystemInfoProvider>,
}

impl std::fmt::Debug for EngineParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineParts")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

pub struct PolicyEngine {
    pub(crate) settings: EngineSettings,
    pub(crate) catalog: Arc<CatalogCache>,
    pub(crate) overrides: OverrideManager,
    pub(crate) change_log: Arc<dyn ChangeLog>,
    pub(crate) executors: ExecutorSet,
    pub(crate) restore_points: Arc<dyn RestorePointManager>,
    pub(crate) system: Arc<dyn SystemInfoProvider>,
    /// Held for the whole of an apply or revert.
    pub(crate) batch: Mutex<()>,
    watcher: Mutex<Option<CatalogWatcher>>,
}

/// The catalog one command runs against, with overrides merged in.
pub(crate) struct Effective {
    pub loaded: Arc<LoadedCatalog>,
    pub catalog: Catalog,
    pub system: SystemInfo,
}

impl Effective {
    pub fn is_applicable(&self, policy: &PolicyDefinition) -> bool {
        check_compatibility(policy, &self.system).is_applicable()
    }
}

impl PolicyEngine {
    /// Production wiring: policy directory, SQLite change log, and the command-line host adapters.
    pub fn open(settings: EngineSettings) -> anyhow::Result<Self> {
        let source = DirectorySource::new(settings.policy_dir.clone(), &settings.exclude)
            .context("build policy source")?;
        let change_log = SqliteChangeLog::open(&settings.changelog_db)
            .with_context(|| format!("open change log {}", settings.changelog_db))?;

        Self::from_parts(EngineParts {
            settings,
            source: Arc::new(source),
            change_log: Arc::new(change_log),
            hosts: hardline_exec::windows::hosts(),
            restore_points: Arc::new(hardline_exec::windows::restore_points()),
            system: Arc::new(hardline_exec::windows::system_info()),
        })
    }

    /// Wire an engine from explicit parts. Loads and graph-validates the catalog up front; a
    /// dependency cycle is fatal here.
    pub fn from_parts(parts: EngineParts) -> anyhow::Result<Self> {
        let catalog = Arc::new(CatalogCache::new(parts.source));
        let loaded = catalog.get().context("load policy catalog")?;
        tracing::info!(
            policies = loaded.catalog.len(),
            rejected = loaded.issues.len(),
            "policy engine ready"
        );

        Ok(Self {
            overrides: OverrideManager::new(parts.settings.override_file.clone()),
            settings: parts.settings,
            catalog,
            change_log: parts.change_log,
            executors: ExecutorSet::new(parts.hosts),
            restore_points: parts.restore_points,
            system: parts.system,
            batch: Mutex::new(()),
            watcher: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A request for `policy_ids` carrying the configured batch defaults.
    pub fn apply_request<I, S>(&self, policy_ids: I) -> ApplyRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<PolicyId>,
    {
        let mut request = ApplyRequest::new(policy_ids);
        request.continue_on_error = self.settings.continue_on_error;
        request.create_restore_point = self.settings.create_restore_point;
        request
    }

    // ------------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------------

    /// Start polling the policy directory; changes invalidate the cache after the debounce.
    ///
    /// A no-op for sources that are not file-backed or when already watching.
    pub fn watch(&self) -> anyhow::Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let Some(root) = self.catalog.source().watch_root() else {
            return Ok(());
        };
        let options = WatchOptions {
            poll_interval: Duration::from_millis(self.settings.watch_poll_ms),
            debounce: Duration::from_millis(self.settings.watch_debounce_ms),
        };
        let cache = Arc::clone(&self.catalog);
        let watcher = CatalogWatcher::spawn(root.to_owned(), options, move || cache.invalidate())
            .with_context(|| format!("watch policy directory {root}"))?;
        *slot = Some(watcher);
        Ok(())
    }

    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    /// Reload the catalog now. On failure the previous catalog stays in service.
    pub fn reload_catalog(&self) -> anyhow::Result<usize> {
        let loaded = self.catalog.reload().context("reload policy catalog")?;
        Ok(loaded.catalog.len())
    }

    /// Persisted overrides, as stored.
    pub fn overrides(&self) -> anyhow::Result<BTreeMap<PolicyId, Value>> {
        self.overrides.overrides().context("read overrides")
    }

    /// Merge `updates` into the override file. Returns whether anything changed.
    pub fn update_overrides(&self, updates: BTreeMap<PolicyId, Value>) -> anyhow::Result<bool> {
        self.overrides
            .update_overrides(updates)
            .context("update overrides")
    }

    pub fn remove_overrides(&self, policy_ids: &[PolicyId]) -> anyhow::Result<bool> {
        self.overrides
            .remove_overrides(policy_ids)
            .context("remove overrides")
    }

    /// Current catalog merged with persisted and then `request` overrides.
    ///
    /// Override problems are warnings; only an unusable catalog is an error.
    pub(crate) fn effective(
        &self,
        request: &BTreeMap<PolicyId, Value>,
        warnings: &mut Vec<ErrorInfo>,
    ) -> Result<Effective, ErrorInfo> {
        let loaded = self.catalog.get().map_err(catalog_error)?;

        let persisted = match self.overrides.overrides() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "override file unreadable; using shipped definitions");
                warnings.push(ErrorInfo::new(
                    ids::CODE_OVERRIDE_INVALID,
                    format!("override file ignored: {e}"),
                ));
                BTreeMap::new()
            }
        };
        let layered = layer_overrides(&[&persisted, request]);
        let (catalog, issues) = apply_overrides(&loaded.catalog, &layered);
        for issue in issues {
            tracing::warn!(error = %issue, "override skipped");
            warnings.push(ErrorInfo::new(ids::CODE_OVERRIDE_INVALID, issue.to_string()));
        }

        Ok(Effective {
            loaded,
            catalog,
            system: self.system.system_info(),
        })
    }

    /// Probe every applicable policy. A failed probe is recorded as not applied, with a warning.
    pub(crate) fn capture_states(
        &self,
        effective: &Effective,
        warnings: &mut Vec<ErrorInfo>,
    ) -> Vec<SnapshotPolicyState> {
        let mut states = Vec::new();
        for policy in effective.catalog.iter() {
            if !effective.is_applicable(policy) {
                continue;
            }
            let exec = self.executors.for_policy(policy);
            let probed = exec
                .is_applied(policy)
                .and_then(|applied| Ok((applied, exec.current_value(policy)?)));
            let state = match probed {
                Ok((is_applied, value)) => SnapshotPolicyState {
                    policy_id: policy.policy_id.clone(),
                    is_applied,
                    current_value: Some(value),
                },
                Err(e) => {
                    warnings.push(ErrorInfo::for_policy(
                        e.failure_kind().error_code(),
                        &policy.policy_id,
                        format!("snapshot probe failed: {e}"),
                    ));
                    SnapshotPolicyState {
                        policy_id: policy.policy_id.clone(),
                        is_applied: false,
                        current_value: None,
                    }
                }
            };
            states.push(state);
        }
        states
    }

    /// Capture and persist a snapshot. When persisting fails the snapshot keeps an in-memory id
    /// and the second value is `false`.
    pub(crate) fn take_snapshot(
        &self,
        effective: &Effective,
        description: String,
        restore_point_id: Option<String>,
        persist: bool,
        warnings: &mut Vec<ErrorInfo>,
    ) -> (Snapshot, bool) {
        let states = self.capture_states(effective, warnings);
        let mut snapshot = Snapshot {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            description,
            created_at: OffsetDateTime::now_utc(),
            system: effective.system.clone(),
            restore_point_id,
            catalog_fingerprint: effective.catalog.fingerprint(),
            states,
        };

        if !persist {
            snapshot.snapshot_id = unpersisted_id();
            return (snapshot, false);
        }
        match self.change_log.create_snapshot(&snapshot) {
            Ok(()) => {
                tracing::info!(
                    snapshot_id = %snapshot.snapshot_id,
                    states = snapshot.states.len(),
                    "snapshot recorded"
                );
                (snapshot, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "snapshot not persisted; continuing with in-memory id");
                snapshot.snapshot_id = unpersisted_id();
                warnings.push(ErrorInfo::new(
                    ids::CODE_PERSISTENCE_ERROR,
                    format!("snapshot kept in memory only: {e}"),
                ));
                (snapshot, false)
            }
        }
    }

    /// Best effort; a failure is a warning and the batch proceeds without one.
    pub(crate) fn restore_point(
        &self,
        description: &str,
        warnings: &mut Vec<ErrorInfo>,
    ) -> Option<String> {
        match self.restore_points.create(description) {
            Ok(id) => {
                tracing::info!(restore_point_id = %id, "restore point created");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "restore point not created");
                warnings.push(ErrorInfo::new(
                    ids::CODE_RESTORE_POINT_FAILED,
                    format!("restore point not created: {e}"),
                ));
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Thin commands
    // ------------------------------------------------------------------------

    /// Effective policy definitions, optionally narrowed to one category or to this host.
    pub fn get_policies(&self, category: Option<&str>, only_applicable: bool) -> PoliciesResponse {
        let mut resp = PoliciesResponse::default();
        let effective = match self.effective(&BTreeMap::new(), &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };
        for issue in &effective.loaded.issues {
            resp.warnings.push(ErrorInfo::new(
                ids::CODE_VALIDATION_ERROR,
                format!("{}: {}", issue.source, issue.error),
            ));
        }
        for m in &effective.loaded.missing {
            resp.warnings.push(ErrorInfo::for_policy(
                ids::CODE_DEPENDENCY_MISSING,
                &m.policy_id,
                format!("{} dependency {} is not in the catalog", m.dependency_type.as_str(), m.target),
            ));
        }

        resp.policies = effective
            .catalog
            .iter()
            .filter(|p| category.is_none_or(|c| p.category.eq_ignore_ascii_case(c)))
            .filter(|p| !only_applicable || effective.is_applicable(p))
            .cloned()
            .collect();
        resp.success = true;
        resp
    }

    /// Record the current state of every applicable policy.
    pub fn create_snapshot(&self, description: &str, create_restore_point: bool) -> SnapshotResponse {
        let mut resp = SnapshotResponse::default();
        let effective = match self.effective(&BTreeMap::new(), &mut resp.warnings) {
            Ok(e) => e,
            Err(e) => {
                resp.errors.push(e);
                return resp;
            }
        };
        let restore_point_id = if create_restore_point {
            self.restore_point(description, &mut resp.warnings)
        } else {
            None
        };
        let (snapshot, persisted) = self.take_snapshot(
            &effective,
            description.to_string(),
            restore_point_id,
            true,
            &mut resp.warnings,
        );
        resp.snapshot = Some(snapshot);
        resp.persisted = persisted;
        resp.success = true;
        resp
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("settings", &self.settings)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl Drop for PolicyEngine {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

pub(crate) fn unpersisted_id() -> String {
    format!("{}{}", ids::UNPERSISTED_SNAPSHOT_PREFIX, uuid::Uuid::new_v4())
}

pub(crate) fn catalog_error(e: CatalogError) -> ErrorInfo {
    let code = match &e {
        CatalogError::Graph(_) => ids::CODE_GRAPH_ERROR,
        _ => ids::CODE_CATALOG_ERROR,
    };
    tracing::error!(error = %e, "policy catalog unavailable");
    ErrorInfo::new(code, e.to_string())
}
