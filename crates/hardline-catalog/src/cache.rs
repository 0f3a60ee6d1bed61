use crate::{CatalogError, PolicySource};
use hardline_domain::{Catalog, MissingDependency, ValidationIssue, validate_graph};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One validated load of the policy source.
#[derive(Debug, Clone, Default)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    /// Records that were rejected during this load.
    pub issues: Vec<ValidationIssue>,
    /// Mandatory edges pointing outside the catalog, found by graph validation.
    pub missing: Vec<MissingDependency>,
    /// Bumped on every successful load; lets callers notice a reload.
    pub generation: u64,
}

impl LoadedCatalog {
    pub fn new(catalog: Catalog, issues: Vec<ValidationIssue>) -> Self {
        Self {
            catalog,
            issues,
            missing: Vec::new(),
            generation: 0,
        }
    }
}

type Subscriber = Box<dyn Fn() + Send + Sync>;

/// Lazily loaded, atomically swapped catalog.
///
/// Readers get an `Arc` to a complete load; an invalidation drops the cached value so the next
/// `get` reloads from the source. Nothing is ever edited in place.
pub struct CatalogCache {
    source: Arc<dyn PolicySource>,
    current: RwLock<Option<Arc<LoadedCatalog>>>,
    generation: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn PolicySource> {
        &self.source
    }

    /// Current catalog, loading it first if the cache is empty.
    ///
    /// A mandatory dependency cycle fails the load and leaves the cache empty.
    pub fn get(&self) -> Result<Arc<LoadedCatalog>, CatalogError> {
        if let Some(loaded) = self.current.read().as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let mut slot = self.current.write();
        if let Some(loaded) = slot.as_ref() {
            return Ok(Arc::clone(loaded));
        }
        let loaded = Arc::new(self.load_validated()?);
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drop the cached catalog and notify subscribers.
    pub fn invalidate(&self) {
        self.current.write().take();
        tracing::debug!("policy catalog invalidated");
        for subscriber in self.subscribers.lock().iter() {
            subscriber();
        }
    }

    /// Force a reload now. On failure the previous catalog is kept.
    pub fn reload(&self) -> Result<Arc<LoadedCatalog>, CatalogError> {
        let loaded = Arc::new(self.load_validated()?);
        *self.current.write() = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Called after every invalidation, on the invalidating thread.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(callback));
    }

    fn load_validated(&self) -> Result<LoadedCatalog, CatalogError> {
        let mut loaded = self.source.load()?;
        for issue in &loaded.issues {
            tracing::warn!(source = %issue.source, error = %issue.error, "policy record rejected");
        }

        let report = validate_graph(&loaded.catalog).inspect_err(|e| {
            tracing::error!(error = %e, "policy catalog failed graph validation");
        })?;
        for m in &report.missing {
            tracing::warn!(
                policy_id = %m.policy_id,
                target = %m.target,
                kind = m.dependency_type.as_str(),
                "dependency target not in catalog"
            );
        }

        loaded.missing = report.missing;
        loaded.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            policies = loaded.catalog.len(),
            rejected = loaded.issues.len(),
            generation = loaded.generation,
            "policy catalog loaded"
        );
        Ok(loaded)
    }
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("loaded", &self.is_loaded())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}
