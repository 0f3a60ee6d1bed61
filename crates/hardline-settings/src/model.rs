use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `hardline.toml` schema v1.
///
/// Every field is optional; anything left out falls back to the engine defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HardlineConfigV1 {
    /// Optional schema string for tooling (`hardline.config.v1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Directory scanned recursively for policy documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_dir: Option<String>,

    /// Glob patterns (relative to `policy_dir`) for documents to skip.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// JSON file holding persisted policy overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_file: Option<String>,

    /// SQLite database for the change log and snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_db: Option<String>,

    /// Quiet period before a policy tree change triggers a reload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_debounce_ms: Option<u64>,

    /// How often the watcher fingerprints the policy tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_poll_ms: Option<u64>,

    /// Default for apply requests that do not say otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,

    /// Default for apply/revert/snapshot requests that do not say otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_restore_point: Option<bool>,

    /// Named policy selections usable as `profile_name` in apply requests.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub policies: Vec<String>,
}
