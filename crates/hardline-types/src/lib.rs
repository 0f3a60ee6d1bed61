//! Stable DTOs and IDs used across the hardline workspace.
//!
//! This crate is intentionally boring:
//! - policy definitions and the per-mechanism details union
//! - change records, snapshots, and drift items
//! - command requests/responses exchanged with the UI/CLI collaborators
//! - stable string codes and the explain registry for them

#![forbid(unsafe_code)]

pub mod api;
pub mod change;
pub mod explain;
pub mod ids;
pub mod policy;
pub mod policy_id;

pub use api::{
    AppliedPolicy, ApplyRequest, ApplyResponse, AuditResponse, AuditResult, AuditSummary,
    DriftResponse, ErrorInfo, PoliciesResponse, RevertRequest, RevertResponse, RevertSelector,
    SkippedPolicy, SnapshotResponse, StateResponse, SystemInfo,
};
pub use change::{ChangeRecord, DriftItem, FailureKind, Operation, Snapshot, SnapshotPolicyState};
pub use explain::{Explanation, lookup_explanation};
pub use policy::{
    Applicability, DependencyType, EndpointSet, FirewallAction, FirewallDetails,
    FirewallDirection, FirewallProtocol, FirewallRule, Mechanism, MechanismDetails,
    PolicyDefinition, PolicyDependency, RegistryAction, RegistryDetails, RegistryHive,
    RegistryValueType, RiskLevel, ScheduledTaskAction, ScheduledTaskDetails, ScriptDetails,
    ServiceDetails, ServiceStartupType, SupportStatus,
};
pub use policy_id::PolicyId;
