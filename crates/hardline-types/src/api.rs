//! Command requests and responses exchanged with the UI/CLI collaborators.
//!
//! Every response carries `success`, `errors[]`, and `warnings[]` next to its payload. Responses
//! are always produced, even when every policy in a batch failed.

use crate::{ChangeRecord, DriftItem, Mechanism, PolicyDefinition, PolicyId, RiskLevel, Snapshot};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorInfo {
    /// Stable code from [`crate::ids`].
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            policy_id: None,
            message: message.into(),
        }
    }

    pub fn for_policy(code: &str, policy_id: &PolicyId, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            policy_id: Some(policy_id.clone()),
            message: message.into(),
        }
    }
}

/// Host facts the compatibility gate and snapshots depend on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SystemInfo {
    pub windows_build: u32,
    pub sku: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
}

// ============================================================================
// Policies
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoliciesResponse {
    pub success: bool,
    pub policies: Vec<PolicyDefinition>,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplyRequest {
    #[serde(default)]
    pub policy_ids: Vec<PolicyId>,
    /// Per-request mechanism detail fragments, merged over persisted overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<PolicyId, JsonValue>,
    #[serde(default)]
    pub create_restore_point: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

fn default_continue_on_error() -> bool {
    true
}

impl ApplyRequest {
    pub fn new<I, S>(policy_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PolicyId>,
    {
        Self {
            policy_ids: policy_ids.into_iter().map(Into::into).collect(),
            overrides: BTreeMap::new(),
            create_restore_point: false,
            dry_run: false,
            continue_on_error: true,
            profile_name: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkippedPolicy {
    pub policy_id: PolicyId,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplyResponse {
    pub success: bool,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// False when the snapshot only exists in memory because persisting it failed.
    pub snapshot_persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_point_id: Option<String>,
    /// Resolved execution order (dependencies first).
    pub planned: Vec<PolicyId>,
    pub applied: Vec<PolicyId>,
    pub failed: Vec<PolicyId>,
    #[serde(default)]
    pub skipped: Vec<SkippedPolicy>,
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

// ============================================================================
// Revert
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum RevertSelector {
    /// Empty means every tool-applied policy.
    Policies {
        #[serde(default)]
        policy_ids: Vec<PolicyId>,
    },
    Snapshot { snapshot_id: String },
    RestorePoint { restore_point_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RevertRequest {
    pub selector: RevertSelector,
    #[serde(default)]
    pub create_restore_point: bool,
}

impl RevertRequest {
    pub fn policies<I, S>(policy_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PolicyId>,
    {
        Self {
            selector: RevertSelector::Policies {
                policy_ids: policy_ids.into_iter().map(Into::into).collect(),
            },
            create_restore_point: false,
        }
    }

    pub fn snapshot(snapshot_id: impl Into<String>) -> Self {
        Self {
            selector: RevertSelector::Snapshot {
                snapshot_id: snapshot_id.into(),
            },
            create_restore_point: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RevertResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_point_id: Option<String>,
    pub reverted: Vec<PolicyId>,
    pub failed: Vec<PolicyId>,
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditResult {
    pub policy_id: PolicyId,
    pub name: String,
    pub category: String,
    pub mechanism: Mechanism,
    pub risk_level: RiskLevel,
    pub applicable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// `None` when the policy was not probed (inapplicable or probe failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    pub expected_value: String,
    pub tool_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditSummary {
    pub total: u32,
    pub applicable: u32,
    pub applied: u32,
    pub not_applied: u32,
    pub not_applicable: u32,
    pub errors: u32,
}

impl AuditSummary {
    pub fn from_results(results: &[AuditResult]) -> Self {
        let mut s = AuditSummary {
            total: results.len() as u32,
            ..AuditSummary::default()
        };
        for r in results {
            if !r.applicable {
                s.not_applicable += 1;
                continue;
            }
            s.applicable += 1;
            match (r.is_applied, &r.error) {
                (_, Some(_)) => s.errors += 1,
                (Some(true), None) => s.applied += 1,
                (Some(false), None) => s.not_applied += 1,
                (None, None) => s.errors += 1,
            }
        }
        s
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditResponse {
    pub success: bool,
    pub system: SystemInfo,
    pub results: Vec<AuditResult>,
    pub summary: AuditSummary,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

// ============================================================================
// State, drift, snapshots
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppliedPolicy {
    pub policy_id: PolicyId,
    pub change_id: String,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StateResponse {
    pub success: bool,
    pub system: SystemInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_snapshot: Option<Snapshot>,
    /// All snapshots, newest first; only populated when history was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
    pub tool_applied: Vec<AppliedPolicy>,
    /// Full change history, oldest first; only populated when history was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChangeRecord>,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriftResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub checked: u32,
    pub drift: Vec<DriftItem>,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    pub persisted: bool,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}
