//! Policy catalog adapters: discover and parse policy documents, cache the validated catalog,
//! watch the policy tree for changes, and persist user overrides.
//!
//! This crate does filesystem IO. It never mutates the host being hardened.

#![forbid(unsafe_code)]

mod cache;
mod discover;
mod error;
mod overrides;
mod parse;
mod source;
mod watcher;

pub use cache::{CatalogCache, LoadedCatalog};
pub use discover::{POLICY_EXTENSIONS, build_exclude_set, discover_policy_files};
pub use error::CatalogError;
pub use overrides::OverrideManager;
pub use parse::{DocumentFormat, parse_policy_document};
pub use source::{DirectorySource, PolicySource, StaticSource};
pub use watcher::{CatalogWatcher, WatchOptions, tree_fingerprint};
