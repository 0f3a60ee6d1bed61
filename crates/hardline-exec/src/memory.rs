//! In-process host adapters.
//!
//! Used by tests and by dry environments where touching the machine is not allowed. Every adapter
//! counts its mutations and supports fault injection per target (`deny` gives
//! [`HostError::AccessDenied`], `fail` gives [`HostError::Failed`]); reads are never faulted.

use crate::host::{
    CommandOutput, CommandRunner, FirewallHost, Hosts, RegistryHost, RegistryValue, ServiceHost,
    ServiceInfo, TaskHost, TaskInfo,
};
use crate::{HostError, RestorePointManager};
use hardline_types::{FirewallRule, RegistryHive};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Faults {
    denied: Mutex<BTreeSet<String>>,
    failing: Mutex<BTreeSet<String>>,
    mutations: AtomicUsize,
}

impl Faults {
    fn deny(&self, target: &str) {
        self.denied.lock().insert(target.to_ascii_lowercase());
    }

    fn fail(&self, target: &str) {
        self.failing.lock().insert(target.to_ascii_lowercase());
    }

    /// Gate for a mutation of `target`; counts the attempt when it goes through.
    fn mutate(&self, target: &str) -> Result<(), HostError> {
        let key = target.to_ascii_lowercase();
        if self.denied.lock().contains(&key) {
            return Err(HostError::AccessDenied(target.to_string()));
        }
        if self.failing.lock().contains(&key) {
            return Err(HostError::Failed(format!("injected failure for {target}")));
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Registry
// ============================================================================

type RegistryKey = (RegistryHive, String, String);

fn registry_key(hive: RegistryHive, key: &str, name: &str) -> RegistryKey {
    (hive, key.to_ascii_lowercase(), name.to_ascii_lowercase())
}

/// Key paths and value names compare case-insensitively, as on Windows.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    values: Mutex<BTreeMap<RegistryKey, RegistryValue>>,
    faults: Faults,
}

impl MemoryRegistry {
    pub fn insert(&self, hive: RegistryHive, key: &str, name: &str, value: RegistryValue) {
        self.values.lock().insert(registry_key(hive, key, name), value);
    }

    pub fn value(&self, hive: RegistryHive, key: &str, name: &str) -> Option<RegistryValue> {
        self.values.lock().get(&registry_key(hive, key, name)).cloned()
    }

    /// Deny writes anywhere under the key path.
    pub fn deny(&self, key: &str) {
        self.faults.deny(key);
    }

    pub fn fail(&self, key: &str) {
        self.faults.fail(key);
    }

    pub fn mutations(&self) -> usize {
        self.faults.count()
    }
}

impl RegistryHost for MemoryRegistry {
    fn get_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
    ) -> Result<Option<RegistryValue>, HostError> {
        Ok(self.value(hive, key, name))
    }

    fn set_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
        value: &RegistryValue,
    ) -> Result<(), HostError> {
        self.faults.mutate(key)?;
        self.insert(hive, key, name, value.clone());
        Ok(())
    }

    fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> Result<bool, HostError> {
        self.faults.mutate(key)?;
        Ok(self.values.lock().remove(&registry_key(hive, key, name)).is_some())
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryServices {
    services: Mutex<BTreeMap<String, ServiceInfo>>,
    faults: Faults,
}

impl MemoryServices {
    pub fn install(&self, name: &str, startup_type: &str, running: bool) {
        self.services.lock().insert(
            name.to_ascii_lowercase(),
            ServiceInfo {
                startup_type: startup_type.to_string(),
                running,
            },
        );
    }

    pub fn info(&self, name: &str) -> Option<ServiceInfo> {
        self.services.lock().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn deny(&self, name: &str) {
        self.faults.deny(name);
    }

    pub fn fail(&self, name: &str) {
        self.faults.fail(name);
    }

    pub fn mutations(&self) -> usize {
        self.faults.count()
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut ServiceInfo)) -> Result<(), HostError> {
        self.faults.mutate(name)?;
        let mut services = self.services.lock();
        let info = services
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| HostError::NotFound(format!("service {name}")))?;
        f(info);
        Ok(())
    }
}

impl ServiceHost for MemoryServices {
    fn query(&self, name: &str) -> Result<Option<ServiceInfo>, HostError> {
        Ok(self.info(name))
    }

    fn set_startup_type(&self, name: &str, startup_type: &str) -> Result<(), HostError> {
        self.update(name, |info| info.startup_type = startup_type.to_string())
    }

    fn stop(&self, name: &str) -> Result<(), HostError> {
        self.update(name, |info| info.running = false)
    }

    fn start(&self, name: &str) -> Result<(), HostError> {
        self.update(name, |info| info.running = true)
    }
}

// ============================================================================
// Scheduled tasks
// ============================================================================

#[derive(Debug, Clone)]
struct TaskEntry {
    info: TaskInfo,
    xml: String,
}

#[derive(Debug, Default)]
pub struct MemoryTasks {
    tasks: Mutex<BTreeMap<String, TaskEntry>>,
    faults: Faults,
}

impl MemoryTasks {
    /// Register an enabled task with enabled triggers.
    pub fn register(&self, path: &str, xml: &str) {
        self.tasks.lock().insert(
            path.to_ascii_lowercase(),
            TaskEntry {
                info: TaskInfo {
                    enabled: true,
                    triggers_enabled: true,
                },
                xml: xml.to_string(),
            },
        );
    }

    pub fn info(&self, path: &str) -> Option<TaskInfo> {
        self.tasks.lock().get(&path.to_ascii_lowercase()).map(|t| t.info)
    }

    pub fn deny(&self, path: &str) {
        self.faults.deny(path);
    }

    pub fn fail(&self, path: &str) {
        self.faults.fail(path);
    }

    pub fn mutations(&self) -> usize {
        self.faults.count()
    }

    fn update(&self, path: &str, f: impl FnOnce(&mut TaskInfo)) -> Result<(), HostError> {
        self.faults.mutate(path)?;
        let mut tasks = self.tasks.lock();
        let entry = tasks
            .get_mut(&path.to_ascii_lowercase())
            .ok_or_else(|| HostError::NotFound(format!("task {path}")))?;
        f(&mut entry.info);
        Ok(())
    }
}

impl TaskHost for MemoryTasks {
    fn query(&self, path: &str) -> Result<Option<TaskInfo>, HostError> {
        Ok(self.info(path))
    }

    fn set_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError> {
        self.update(path, |info| info.enabled = enabled)
    }

    fn set_triggers_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError> {
        self.update(path, |info| info.triggers_enabled = enabled)
    }

    fn delete(&self, path: &str) -> Result<(), HostError> {
        self.faults.mutate(path)?;
        self.tasks
            .lock()
            .remove(&path.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound(format!("task {path}")))
    }

    fn export_xml(&self, path: &str) -> Result<String, HostError> {
        self.tasks
            .lock()
            .get(&path.to_ascii_lowercase())
            .map(|t| t.xml.clone())
            .ok_or_else(|| HostError::NotFound(format!("task {path}")))
    }
}

// ============================================================================
// Firewall
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryFirewall {
    rules: Mutex<BTreeMap<String, FirewallRule>>,
    faults: Faults,
}

impl MemoryFirewall {
    pub fn add(&self, rule: FirewallRule) {
        self.rules.lock().insert(rule.name.to_ascii_lowercase(), rule);
    }

    pub fn rule(&self, name: &str) -> Option<FirewallRule> {
        self.rules.lock().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.lock().values().map(|r| r.name.clone()).collect()
    }

    pub fn deny(&self, name: &str) {
        self.faults.deny(name);
    }

    pub fn fail(&self, name: &str) {
        self.faults.fail(name);
    }

    pub fn mutations(&self) -> usize {
        self.faults.count()
    }
}

impl FirewallHost for MemoryFirewall {
    fn get_rule(&self, name: &str) -> Result<Option<FirewallRule>, HostError> {
        Ok(self.rule(name))
    }

    fn rules_with_prefix(&self, prefix: &str) -> Result<Vec<FirewallRule>, HostError> {
        let prefix = prefix.to_ascii_lowercase();
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn upsert_rule(&self, rule: &FirewallRule) -> Result<(), HostError> {
        self.faults.mutate(&rule.name)?;
        self.add(rule.clone());
        Ok(())
    }

    fn remove_rule(&self, name: &str) -> Result<bool, HostError> {
        self.faults.mutate(name)?;
        Ok(self.rules.lock().remove(&name.to_ascii_lowercase()).is_some())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Canned command outputs. Unknown commands exit with code 1.
#[derive(Debug, Default)]
pub struct MemoryCommands {
    outputs: Mutex<BTreeMap<String, CommandOutput>>,
    /// apply command -> (verify command, verify output after apply)
    links: Mutex<BTreeMap<String, (String, String)>>,
    history: Mutex<Vec<String>>,
    faults: Faults,
}

impl MemoryCommands {
    pub fn set_output(&self, command: &str, stdout: &str) {
        self.outputs
            .lock()
            .insert(command.to_string(), CommandOutput::ok(stdout));
    }

    pub fn set_result(&self, command: &str, output: CommandOutput) {
        self.outputs.lock().insert(command.to_string(), output);
    }

    /// Running `command` succeeds and makes `verify` print `stdout_after` from then on.
    pub fn link(&self, command: &str, verify: &str, stdout_after: &str) {
        self.links
            .lock()
            .insert(command.to_string(), (verify.to_string(), stdout_after.to_string()));
    }

    pub fn deny(&self, command: &str) {
        self.faults.deny(command);
    }

    /// Every command run so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    pub fn mutations(&self) -> usize {
        self.faults.count()
    }
}

impl CommandRunner for MemoryCommands {
    fn run(&self, command: &str) -> Result<CommandOutput, HostError> {
        self.history.lock().push(command.to_string());
        let link = self.links.lock().get(command).cloned();
        if let Some((verify, after)) = link {
            self.faults.mutate(command)?;
            self.set_output(&verify, &after);
            return Ok(CommandOutput::ok(""));
        }
        Ok(self
            .outputs
            .lock()
            .get(command)
            .cloned()
            .unwrap_or_else(|| CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("unknown command: {command}"),
            }))
    }
}

// ============================================================================
// Restore points
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryRestorePoints {
    created: Mutex<Vec<String>>,
    failing: Mutex<Option<HostError>>,
}

impl MemoryRestorePoints {
    /// Make every later `create` fail with `err`.
    pub fn fail_with(&self, err: HostError) {
        *self.failing.lock() = Some(err);
    }

    /// Descriptions of the restore points created so far.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

impl RestorePointManager for MemoryRestorePoints {
    fn create(&self, description: &str) -> Result<String, HostError> {
        if let Some(err) = self.failing.lock().clone() {
            return Err(err);
        }
        let mut created = self.created.lock();
        created.push(description.to_string());
        Ok(format!("rp-{}", created.len()))
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// One in-memory adapter per mechanism, kept reachable for seeding and assertions.
#[derive(Debug, Default, Clone)]
pub struct MemoryHost {
    pub registry: Arc<MemoryRegistry>,
    pub services: Arc<MemoryServices>,
    pub tasks: Arc<MemoryTasks>,
    pub firewall: Arc<MemoryFirewall>,
    pub commands: Arc<MemoryCommands>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hosts(&self) -> Hosts {
        Hosts {
            registry: self.registry.clone(),
            services: self.services.clone(),
            tasks: self.tasks.clone(),
            firewall: self.firewall.clone(),
            commands: self.commands.clone(),
        }
    }

    /// Host mutations across all adapters.
    pub fn mutations(&self) -> usize {
        self.registry.mutations()
            + self.services.mutations()
            + self.tasks.mutations()
            + self.firewall.mutations()
            + self.commands.mutations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_types::RegistryValueType;

    #[test]
    fn registry_is_case_insensitive_and_counts_writes() {
        let reg = MemoryRegistry::default();
        let v = RegistryValue {
            value_type: RegistryValueType::Dword,
            data: "1".to_string(),
        };
        reg.set_value(RegistryHive::LocalMachine, "SOFTWARE\\X", "Val", &v)
            .expect("write");
        assert_eq!(
            reg.get_value(RegistryHive::LocalMachine, "software\\x", "VAL")
                .expect("read"),
            Some(v)
        );
        assert_eq!(reg.mutations(), 1);
    }

    #[test]
    fn denied_writes_do_not_count() {
        let services = MemoryServices::default();
        services.install("DiagTrack", "Automatic", true);
        services.deny("diagtrack");
        assert!(matches!(
            services.stop("DiagTrack"),
            Err(HostError::AccessDenied(_))
        ));
        assert_eq!(services.mutations(), 0);
        assert_eq!(services.info("DiagTrack").map(|i| i.running), Some(true));
    }

    #[test]
    fn restore_points_number_sequentially_until_failed() {
        let rp = MemoryRestorePoints::default();
        assert_eq!(rp.create("first").expect("create"), "rp-1");
        rp.fail_with(HostError::Unsupported("System Restore disabled".to_string()));
        assert!(rp.create("second").is_err());
        assert_eq!(rp.created(), vec!["first".to_string()]);
    }
}
