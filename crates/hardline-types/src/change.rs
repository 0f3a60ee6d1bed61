use crate::api::SystemInfo;
use crate::ids;
use crate::{Mechanism, PolicyId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Apply,
    Revert,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Apply => "apply",
            Operation::Revert => "revert",
        }
    }

    pub fn parse(s: &str) -> Option<Operation> {
        match s {
            "apply" => Some(Operation::Apply),
            "revert" => Some(Operation::Revert),
            _ => None,
        }
    }
}

/// Why a change attempt failed. Lets callers tell "blocked" from "broken".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Execution,
    Authorization,
    NotFound,
    Irreversible,
    Unsupported,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Execution => "execution",
            FailureKind::Authorization => "authorization",
            FailureKind::NotFound => "not_found",
            FailureKind::Irreversible => "irreversible",
            FailureKind::Unsupported => "unsupported",
        }
    }

    /// Error code reported next to a failed record.
    pub fn error_code(self) -> &'static str {
        match self {
            FailureKind::Execution => ids::CODE_EXECUTION_ERROR,
            FailureKind::Authorization => ids::CODE_AUTHORIZATION_ERROR,
            FailureKind::NotFound => ids::CODE_NOT_FOUND,
            FailureKind::Irreversible => ids::CODE_IRREVERSIBLE,
            FailureKind::Unsupported => ids::CODE_UNSUPPORTED,
        }
    }

    pub fn parse(s: &str) -> Option<FailureKind> {
        match s {
            "execution" => Some(FailureKind::Execution),
            "authorization" => Some(FailureKind::Authorization),
            "not_found" => Some(FailureKind::NotFound),
            "irreversible" => Some(FailureKind::Irreversible),
            "unsupported" => Some(FailureKind::Unsupported),
            _ => None,
        }
    }
}

/// One mutation attempt. Write-once: a revert is a new record, never an edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeRecord {
    pub change_id: String,
    pub operation: Operation,
    pub policy_id: PolicyId,
    pub mechanism: Mechanism,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
    /// Mechanism-specific serialization of the state before the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    /// Mechanism-specific serialization of the state after the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Human-readable; never consulted when deriving state.
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotPolicyState {
    pub policy_id: PolicyId,
    pub is_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
}

/// Point-in-time capture of the whole applicable catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub description: String,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub system: SystemInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_point_id: Option<String>,
    #[serde(default)]
    pub catalog_fingerprint: String,
    #[serde(default)]
    pub states: Vec<SnapshotPolicyState>,
}

impl Snapshot {
    pub fn state_for(&self, policy_id: &PolicyId) -> Option<&SnapshotPolicyState> {
        self.states.iter().find(|s| &s.policy_id == policy_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DriftItem {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub expected_applied: bool,
    pub actual_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
}
