use crate::CatalogError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

/// Extensions recognized as policy documents.
pub const POLICY_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "toml"];

pub fn build_exclude_set(patterns: &[String]) -> Result<GlobSet, CatalogError> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        b.add(Glob::new(p)?);
    }
    Ok(b.build()?)
}

/// Find policy documents under `root`, recursively.
///
/// Results are absolute paths sorted by their `/`-separated relative path, so discovery order does
/// not depend on the filesystem. Exclude globs match the relative path.
pub fn discover_policy_files(
    root: &Utf8Path,
    exclude: &GlobSet,
) -> Result<Vec<Utf8PathBuf>, CatalogError> {
    if !root.is_dir() {
        return Err(CatalogError::MissingRoot(root.to_path_buf()));
    }

    let mut out: Vec<(String, Utf8PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(abs) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 path");
            continue;
        };
        let Some(ext) = abs.extension() else {
            continue;
        };
        if !POLICY_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
        {
            continue;
        }

        let rel = abs
            .strip_prefix(root)
            .unwrap_or(&abs)
            .as_str()
            .replace('\\', "/");
        if exclude.is_match(&rel) {
            tracing::debug!(path = %rel, "excluded policy document");
            continue;
        }
        out.push((rel, abs));
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out.into_iter().map(|(_, abs)| abs).collect())
}
