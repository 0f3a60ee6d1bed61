use crate::model::HardlineConfigV1;
use crate::profiles::{Profile, build_profile};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use globset::Glob;
use std::collections::BTreeMap;

pub const DEFAULT_POLICY_DIR: &str = "policies";
pub const DEFAULT_OVERRIDE_FILE: &str = "overrides.json";
pub const DEFAULT_CHANGELOG_DB: &str = "changelog.db";
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_WATCH_POLL_MS: u64 = 250;

/// Command-line or host-supplied values that take precedence over the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Relative paths are joined onto this; defaults to the current directory (`.`).
    pub base_dir: Option<Utf8PathBuf>,
    pub policy_dir: Option<Utf8PathBuf>,
    pub changelog_db: Option<Utf8PathBuf>,
    pub override_file: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub policy_dir: Utf8PathBuf,
    pub exclude: Vec<String>,
    pub override_file: Utf8PathBuf,
    pub changelog_db: Utf8PathBuf,
    pub watch_debounce_ms: u64,
    pub watch_poll_ms: u64,
    pub continue_on_error: bool,
    pub create_restore_point: bool,
    pub profiles: BTreeMap<String, Profile>,
}

impl EngineSettings {
    /// Defaults rooted at `base_dir`.
    pub fn rooted_at(base_dir: &Utf8Path) -> Self {
        Self {
            policy_dir: base_dir.join(DEFAULT_POLICY_DIR),
            exclude: Vec::new(),
            override_file: base_dir.join(DEFAULT_OVERRIDE_FILE),
            changelog_db: base_dir.join(DEFAULT_CHANGELOG_DB),
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
            watch_poll_ms: DEFAULT_WATCH_POLL_MS,
            continue_on_error: true,
            create_restore_point: false,
            profiles: BTreeMap::new(),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }
}

pub fn resolve_config(
    cfg: HardlineConfigV1,
    overrides: Overrides,
) -> anyhow::Result<EngineSettings> {
    if let Some(schema) = cfg.schema.as_deref()
        && schema != crate::CONFIG_SCHEMA_V1
    {
        anyhow::bail!(
            "unsupported config schema: {schema} (expected {})",
            crate::CONFIG_SCHEMA_V1
        );
    }

    let base = overrides
        .base_dir
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    let mut settings = EngineSettings::rooted_at(&base);

    let pick = |over: Option<Utf8PathBuf>, file: Option<String>, default: Utf8PathBuf| {
        over.or(file.map(Utf8PathBuf::from))
            .map(|p| if p.is_absolute() { p } else { base.join(p) })
            .unwrap_or(default)
    };
    settings.policy_dir = pick(overrides.policy_dir, cfg.policy_dir, settings.policy_dir);
    settings.override_file = pick(
        overrides.override_file,
        cfg.override_file,
        settings.override_file,
    );
    settings.changelog_db = pick(
        overrides.changelog_db,
        cfg.changelog_db,
        settings.changelog_db,
    );

    validate_excludes(&cfg.exclude)?;
    settings.exclude = cfg.exclude;

    if let Some(ms) = cfg.watch_debounce_ms {
        settings.watch_debounce_ms = ms;
    }
    if let Some(ms) = cfg.watch_poll_ms {
        if ms == 0 {
            anyhow::bail!("watch_poll_ms must be greater than zero");
        }
        settings.watch_poll_ms = ms;
    }
    if let Some(v) = cfg.continue_on_error {
        settings.continue_on_error = v;
    }
    if let Some(v) = cfg.create_restore_point {
        settings.create_restore_point = v;
    }

    for (name, profile) in &cfg.profiles {
        settings
            .profiles
            .insert(name.clone(), build_profile(name, profile)?);
    }

    Ok(settings)
}

fn validate_excludes(patterns: &[String]) -> anyhow::Result<()> {
    for pattern in patterns {
        Glob::new(pattern).with_context(|| format!("invalid exclude glob: {pattern}"))?;
    }
    Ok(())
}
