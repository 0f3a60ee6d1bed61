use crate::host::Hosts;
use crate::{
    FirewallExecutor, HostError, RegistryExecutor, ScriptExecutor, ServiceExecutor, TaskExecutor,
};
use hardline_types::{ChangeRecord, Mechanism, PolicyDefinition};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reversibility {
    Reversible,
    Irreversible { reason: String },
}

impl Reversibility {
    pub fn is_reversible(&self) -> bool {
        matches!(self, Reversibility::Reversible)
    }
}

/// Uniform apply/revert/probe contract for one mechanism.
pub trait PolicyExecutor: Send + Sync {
    fn mechanism(&self) -> Mechanism;

    /// Whether the host currently matches the policy's expected state.
    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError>;

    /// Audit-readable current state, in the same format as
    /// [`hardline_domain::expected::expected_value`].
    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError>;

    /// Never fails outright; a failed attempt is a record with `success == false`.
    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord;

    /// Undo `original`, restoring its `previous_state`.
    fn revert(&self, policy: &PolicyDefinition, original: &ChangeRecord) -> ChangeRecord;

    fn reversibility(&self, policy: &PolicyDefinition) -> Reversibility;
}

/// Exhaustive mechanism → executor table.
pub struct ExecutorSet {
    registry: RegistryExecutor,
    service: ServiceExecutor,
    task: TaskExecutor,
    firewall: FirewallExecutor,
    script: ScriptExecutor,
}

impl ExecutorSet {
    pub fn new(hosts: Hosts) -> Self {
        Self {
            registry: RegistryExecutor::new(hosts.registry),
            service: ServiceExecutor::new(hosts.services),
            task: TaskExecutor::new(hosts.tasks),
            firewall: FirewallExecutor::new(hosts.firewall),
            script: ScriptExecutor::new(hosts.commands),
        }
    }

    pub fn for_mechanism(&self, mechanism: Mechanism) -> &dyn PolicyExecutor {
        match mechanism {
            Mechanism::Registry => &self.registry,
            Mechanism::Service => &self.service,
            Mechanism::ScheduledTask => &self.task,
            Mechanism::Firewall => &self.firewall,
            Mechanism::Script => &self.script,
        }
    }

    pub fn for_policy(&self, policy: &PolicyDefinition) -> &dyn PolicyExecutor {
        self.for_mechanism(policy.mechanism_kind())
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;

    #[test]
    fn every_mechanism_has_a_matching_executor() {
        let set = ExecutorSet::new(MemoryHost::new().hosts());
        for m in Mechanism::ALL {
            assert_eq!(set.for_mechanism(m).mechanism(), m);
        }
    }
}
