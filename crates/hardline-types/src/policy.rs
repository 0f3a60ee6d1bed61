//! Policy definition model.
//!
//! A policy document is one [`PolicyDefinition`]; its mechanism payload is a tagged union keyed by
//! `type`, so every consumer matches exhaustively over the supported mechanisms.

use crate::PolicyId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyDefinition {
    /// Missing ids and names deserialize as empty so the loader can report them as validation issues.
    #[serde(default)]
    pub policy_id: PolicyId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub support_status: SupportStatus,

    pub mechanism: MechanismDetails,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PolicyDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicability: Option<Applicability>,

    /// Policies are never applied without an explicit request; `true` is rejected at load.
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default = "default_true")]
    pub reversible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_breakage: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl PolicyDefinition {
    pub fn mechanism_kind(&self) -> Mechanism {
        self.mechanism.mechanism()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    #[default]
    Supported,
    Experimental,
    Deprecated,
    Unsupported,
}

/// Mechanism discriminant. Derived from [`MechanismDetails`], never stored separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    Registry,
    Service,
    ScheduledTask,
    Firewall,
    Script,
}

impl Mechanism {
    pub const ALL: [Mechanism; 5] = [
        Mechanism::Registry,
        Mechanism::Service,
        Mechanism::ScheduledTask,
        Mechanism::Firewall,
        Mechanism::Script,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mechanism::Registry => "registry",
            Mechanism::Service => "service",
            Mechanism::ScheduledTask => "scheduled_task",
            Mechanism::Firewall => "firewall",
            Mechanism::Script => "script",
        }
    }

    pub fn parse(s: &str) -> Option<Mechanism> {
        Mechanism::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MechanismDetails {
    Registry(RegistryDetails),
    Service(ServiceDetails),
    ScheduledTask(ScheduledTaskDetails),
    Firewall(FirewallDetails),
    Script(ScriptDetails),
}

impl MechanismDetails {
    pub fn mechanism(&self) -> Mechanism {
        match self {
            MechanismDetails::Registry(_) => Mechanism::Registry,
            MechanismDetails::Service(_) => Mechanism::Service,
            MechanismDetails::ScheduledTask(_) => Mechanism::ScheduledTask,
            MechanismDetails::Firewall(_) => Mechanism::Firewall,
            MechanismDetails::Script(_) => Mechanism::Script,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub enum RegistryHive {
    #[serde(rename = "HKLM", alias = "HKEY_LOCAL_MACHINE")]
    LocalMachine,
    #[serde(rename = "HKCU", alias = "HKEY_CURRENT_USER")]
    CurrentUser,
    #[serde(rename = "HKU", alias = "HKEY_USERS")]
    Users,
    #[serde(rename = "HKCR", alias = "HKEY_CLASSES_ROOT")]
    ClassesRoot,
}

impl RegistryHive {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistryHive::LocalMachine => "HKLM",
            RegistryHive::CurrentUser => "HKCU",
            RegistryHive::Users => "HKU",
            RegistryHive::ClassesRoot => "HKCR",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistryValueType {
    #[serde(alias = "REG_SZ")]
    String,
    #[serde(alias = "REG_EXPAND_SZ")]
    ExpandString,
    #[default]
    #[serde(alias = "REG_DWORD")]
    Dword,
    #[serde(alias = "REG_QWORD")]
    Qword,
    #[serde(alias = "REG_MULTI_SZ")]
    MultiString,
    #[serde(alias = "REG_BINARY")]
    Binary,
}

impl RegistryValueType {
    /// Name used by the Windows registry tooling (`REG_DWORD`, ...).
    pub fn reg_name(self) -> &'static str {
        match self {
            RegistryValueType::String => "REG_SZ",
            RegistryValueType::ExpandString => "REG_EXPAND_SZ",
            RegistryValueType::Dword => "REG_DWORD",
            RegistryValueType::Qword => "REG_QWORD",
            RegistryValueType::MultiString => "REG_MULTI_SZ",
            RegistryValueType::Binary => "REG_BINARY",
        }
    }

    pub fn from_reg_name(name: &str) -> Option<RegistryValueType> {
        match name {
            "REG_SZ" => Some(RegistryValueType::String),
            "REG_EXPAND_SZ" => Some(RegistryValueType::ExpandString),
            "REG_DWORD" => Some(RegistryValueType::Dword),
            "REG_QWORD" => Some(RegistryValueType::Qword),
            "REG_MULTI_SZ" => Some(RegistryValueType::MultiString),
            "REG_BINARY" => Some(RegistryValueType::Binary),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistryAction {
    #[default]
    Set,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegistryDetails {
    pub hive: RegistryHive,
    pub key_path: String,
    pub value_name: String,
    #[serde(default)]
    pub value_type: RegistryValueType,
    /// Ignored for `delete`.
    #[serde(default)]
    pub expected_value: String,
    #[serde(default)]
    pub action: RegistryAction,
}

impl RegistryDetails {
    pub fn full_key(&self) -> String {
        format!("{}\\{}", self.hive.as_str(), self.key_path)
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStartupType {
    Automatic,
    AutomaticDelayedStart,
    Manual,
    Disabled,
}

impl ServiceStartupType {
    /// Literal startup type string; this exact text is stored in change records.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStartupType::Automatic => "Automatic",
            ServiceStartupType::AutomaticDelayedStart => "AutomaticDelayedStart",
            ServiceStartupType::Manual => "Manual",
            ServiceStartupType::Disabled => "Disabled",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceStartupType> {
        match s.trim() {
            "Automatic" | "Auto" => Some(ServiceStartupType::Automatic),
            "AutomaticDelayedStart" => Some(ServiceStartupType::AutomaticDelayedStart),
            "Manual" | "Demand" => Some(ServiceStartupType::Manual),
            "Disabled" => Some(ServiceStartupType::Disabled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceDetails {
    pub service_name: String,
    pub startup_type: ServiceStartupType,
    #[serde(default)]
    pub stop_service: bool,
}

// ============================================================================
// Scheduled task
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledTaskAction {
    #[default]
    Disable,
    /// Irreversible: the task definition is gone after apply.
    Delete,
    ModifyTriggers,
    Export,
}

impl ScheduledTaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduledTaskAction::Disable => "disable",
            ScheduledTaskAction::Delete => "delete",
            ScheduledTaskAction::ModifyTriggers => "modify_triggers",
            ScheduledTaskAction::Export => "export",
        }
    }

    pub fn is_reversible(self) -> bool {
        !matches!(self, ScheduledTaskAction::Delete)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduledTaskDetails {
    /// Full task path, e.g. `\Microsoft\Windows\Application Experience\ProgramDataUpdater`.
    pub task_path: String,
    #[serde(default)]
    pub action: ScheduledTaskAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_directory: Option<String>,
}

// ============================================================================
// Firewall
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FirewallDirection {
    Inbound,
    #[default]
    Outbound,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FirewallAction {
    Allow,
    #[default]
    Block,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FirewallProtocol {
    #[default]
    Any,
    Tcp,
    Udp,
}

impl FirewallDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FirewallDirection::Inbound => "inbound",
            FirewallDirection::Outbound => "outbound",
        }
    }
}

impl FirewallAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FirewallAction::Allow => "allow",
            FirewallAction::Block => "block",
        }
    }
}

impl FirewallProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            FirewallProtocol::Any => "any",
            FirewallProtocol::Tcp => "tcp",
            FirewallProtocol::Udp => "udp",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FirewallRule {
    pub name: String,
    #[serde(default)]
    pub direction: FirewallDirection,
    #[serde(default)]
    pub action: FirewallAction,
    #[serde(default)]
    pub protocol: FirewallProtocol,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

/// A group of endpoints blocked (or allowed) by one rule each, all named `<prefix>-<nnn>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointSet {
    pub rule_name_prefix: String,
    #[serde(default)]
    pub direction: FirewallDirection,
    #[serde(default)]
    pub action: FirewallAction,
    #[serde(default)]
    pub protocol: FirewallProtocol,
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_ports: Vec<String>,
}

impl EndpointSet {
    pub fn rule_name(&self, index: usize) -> String {
        format!("{}-{:03}", self.rule_name_prefix, index + 1)
    }

    /// Concrete rules this set expands to, in endpoint order.
    pub fn rules(&self) -> Vec<FirewallRule> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| FirewallRule {
                name: self.rule_name(i),
                direction: self.direction,
                action: self.action,
                protocol: self.protocol,
                remote_addresses: vec![endpoint.clone()],
                remote_ports: self.remote_ports.clone(),
                program: None,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FirewallDetails {
    Rule(FirewallRule),
    EndpointSet(EndpointSet),
}

// ============================================================================
// Script
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptDetails {
    pub apply_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_command: Option<String>,
    pub verify_command: String,
    /// Compared against the trimmed output of `verify_command`.
    pub expected_output: String,
}

// ============================================================================
// Dependencies and applicability
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    Required,
    Prerequisite,
    Recommended,
    Conflict,
}

impl DependencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyType::Required => "required",
            DependencyType::Prerequisite => "prerequisite",
            DependencyType::Recommended => "recommended",
            DependencyType::Conflict => "conflict",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyDependency {
    pub policy_id: PolicyId,
    #[serde(rename = "type", default)]
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub user_can_override: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl PolicyDependency {
    /// Whether ordering must follow this edge.
    pub fn is_mandatory(&self) -> bool {
        match self.dependency_type {
            DependencyType::Required | DependencyType::Prerequisite => true,
            DependencyType::Recommended => !self.user_can_override,
            DependencyType::Conflict => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Applicability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_build: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_build: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_skus: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_skus: Vec<String>,
}
