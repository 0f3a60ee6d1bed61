//! Engine configuration parsing and profile resolution.
//!
//! This crate is IO-free: it parses and resolves configuration provided as strings. Relative paths
//! are joined onto a caller-supplied base directory, never checked against the filesystem.

#![forbid(unsafe_code)]

mod model;
mod profiles;
mod resolve;

pub use model::{HardlineConfigV1, ProfileConfig};
pub use profiles::Profile;
pub use resolve::{EngineSettings, Overrides};

/// Schema string accepted in the optional `schema` field.
pub const CONFIG_SCHEMA_V1: &str = "hardline.config.v1";

/// Parse `hardline.toml` (or equivalent) into a typed model.
pub fn parse_config_toml(input: &str) -> anyhow::Result<HardlineConfigV1> {
    let cfg: HardlineConfigV1 = toml::from_str(input)?;
    Ok(cfg)
}

/// Resolve the settings the engine runs with (defaults + file + overrides).
pub fn resolve_config(
    cfg: HardlineConfigV1,
    overrides: Overrides,
) -> anyhow::Result<EngineSettings> {
    resolve::resolve_config(cfg, overrides)
}
