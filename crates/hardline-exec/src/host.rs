//! Host adapter traits: the only way executors touch the machine.

use crate::HostError;
use hardline_types::{FirewallRule, RegistryHive, RegistryValueType};
use std::sync::Arc;

/// A registry value as the registry tools print it. DWORD/QWORD data is decimal; multi-string
/// entries are separated by a literal `\0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryValue {
    pub value_type: RegistryValueType,
    pub data: String,
}

pub trait RegistryHost: Send + Sync {
    /// `Ok(None)` when the key or the value does not exist.
    fn get_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
    ) -> Result<Option<RegistryValue>, HostError>;

    /// Creates the key if needed.
    fn set_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
        value: &RegistryValue,
    ) -> Result<(), HostError>;

    /// Returns whether a value was actually removed.
    fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> Result<bool, HostError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Literal startup type (`Automatic`, `AutomaticDelayedStart`, `Manual`, `Disabled`, `Boot`,
    /// `System`), stored verbatim so a revert restores exactly what was there.
    pub startup_type: String,
    pub running: bool,
}

pub trait ServiceHost: Send + Sync {
    /// `Ok(None)` when the service is not installed.
    fn query(&self, name: &str) -> Result<Option<ServiceInfo>, HostError>;
    fn set_startup_type(&self, name: &str, startup_type: &str) -> Result<(), HostError>;
    fn stop(&self, name: &str) -> Result<(), HostError>;
    fn start(&self, name: &str) -> Result<(), HostError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    pub enabled: bool,
    pub triggers_enabled: bool,
}

pub trait TaskHost: Send + Sync {
    /// `Ok(None)` when no task exists at `path`.
    fn query(&self, path: &str) -> Result<Option<TaskInfo>, HostError>;
    fn set_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError>;
    fn set_triggers_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError>;
    fn delete(&self, path: &str) -> Result<(), HostError>;
    /// Task definition XML.
    fn export_xml(&self, path: &str) -> Result<String, HostError>;
}

pub trait FirewallHost: Send + Sync {
    fn get_rule(&self, name: &str) -> Result<Option<FirewallRule>, HostError>;
    /// Every rule whose name starts with `prefix`.
    fn rules_with_prefix(&self, prefix: &str) -> Result<Vec<FirewallRule>, HostError>;
    /// Create the rule, replacing any rule with the same name.
    fn upsert_rule(&self, rule: &FirewallRule) -> Result<(), HostError>;
    /// Returns whether a rule was actually removed.
    fn remove_rule(&self, name: &str) -> Result<bool, HostError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a shell command line (PowerShell on Windows).
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> Result<CommandOutput, HostError>;
}

/// One adapter per mechanism.
#[derive(Clone)]
pub struct Hosts {
    pub registry: Arc<dyn RegistryHost>,
    pub services: Arc<dyn ServiceHost>,
    pub tasks: Arc<dyn TaskHost>,
    pub firewall: Arc<dyn FirewallHost>,
    pub commands: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for Hosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hosts").finish_non_exhaustive()
    }
}
