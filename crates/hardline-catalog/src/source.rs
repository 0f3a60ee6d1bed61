use crate::cache::LoadedCatalog;
use crate::discover::{build_exclude_set, discover_policy_files};
use crate::parse::{DocumentFormat, parse_policy_document};
use crate::CatalogError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::GlobSet;
use hardline_domain::{ValidationError, ValidationIssue, build_catalog};
use hardline_types::PolicyDefinition;
use parking_lot::Mutex;

/// Where policy definitions come from.
pub trait PolicySource: Send + Sync {
    /// Read every record and validate it. Bad records become issues, not errors.
    fn load(&self) -> Result<LoadedCatalog, CatalogError>;

    /// Directory to watch for changes, if the source is file-backed.
    fn watch_root(&self) -> Option<&Utf8Path> {
        None
    }
}

/// Policy documents on disk, one per file, discovered recursively.
#[derive(Debug)]
pub struct DirectorySource {
    root: Utf8PathBuf,
    exclude: GlobSet,
}

impl DirectorySource {
    pub fn new(root: impl Into<Utf8PathBuf>, exclude: &[String]) -> Result<Self, CatalogError> {
        Ok(Self {
            root: root.into(),
            exclude: build_exclude_set(exclude)?,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl PolicySource for DirectorySource {
    fn load(&self) -> Result<LoadedCatalog, CatalogError> {
        let files = discover_policy_files(&self.root, &self.exclude)?;
        let mut records = Vec::with_capacity(files.len());
        let mut parse_issues = Vec::new();

        for path in files {
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .as_str()
                .replace('\\', "/");
            let Some(format) = DocumentFormat::from_path(&path) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Read {
                path: path.clone(),
                source,
            })?;
            match parse_policy_document(format, &text) {
                Ok(policy) => records.push((rel, policy)),
                Err(message) => parse_issues.push(ValidationIssue {
                    source: rel,
                    error: ValidationError::Parse(message),
                }),
            }
        }

        let (catalog, mut issues) = build_catalog(records);
        parse_issues.append(&mut issues);
        Ok(LoadedCatalog::new(catalog, parse_issues))
    }

    fn watch_root(&self) -> Option<&Utf8Path> {
        Some(&self.root)
    }
}

/// In-memory definitions. `replace` stands in for editing files on disk.
#[derive(Debug, Default)]
pub struct StaticSource {
    policies: Mutex<Vec<PolicyDefinition>>,
}

impl StaticSource {
    pub fn new(policies: Vec<PolicyDefinition>) -> Self {
        Self {
            policies: Mutex::new(policies),
        }
    }

    pub fn replace(&self, policies: Vec<PolicyDefinition>) {
        *self.policies.lock() = policies;
    }
}

impl PolicySource for StaticSource {
    fn load(&self) -> Result<LoadedCatalog, CatalogError> {
        let records = self
            .policies
            .lock()
            .iter()
            .cloned()
            .map(|p| ("<memory>".to_string(), p))
            .collect::<Vec<_>>();
        let (catalog, issues) = build_catalog(records);
        Ok(LoadedCatalog::new(catalog, issues))
    }
}
