//! Builders for policy definitions used across test suites.

use hardline_types::{
    Applicability, DependencyType, EndpointSet, FirewallAction, FirewallDetails,
    FirewallDirection, FirewallProtocol, FirewallRule, MechanismDetails, PolicyDefinition,
    PolicyDependency, PolicyId, RegistryAction, RegistryDetails, RegistryHive, RegistryValueType,
    RiskLevel, ScheduledTaskAction, ScheduledTaskDetails, ScriptDetails, ServiceDetails,
    ServiceStartupType, SupportStatus,
};

/// Registry key every registry builder writes under.
pub const TEST_KEY_PATH: &str = "SOFTWARE\\Policies\\Hardline\\Test";

pub fn policy(id: &str, mechanism: MechanismDetails) -> PolicyDefinition {
    PolicyDefinition {
        policy_id: PolicyId::new(id),
        name: format!("Policy {id}"),
        description: String::new(),
        category: "test".to_string(),
        risk_level: RiskLevel::Low,
        support_status: SupportStatus::Supported,
        mechanism,
        dependencies: Vec::new(),
        applicability: None,
        auto_apply: false,
        requires_confirmation: false,
        reversible: true,
        known_breakage: Vec::new(),
        tags: Vec::new(),
        references: Vec::new(),
    }
}

pub fn registry_details(value_name: &str, expected: &str) -> RegistryDetails {
    RegistryDetails {
        hive: RegistryHive::LocalMachine,
        key_path: TEST_KEY_PATH.to_string(),
        value_name: value_name.to_string(),
        value_type: RegistryValueType::Dword,
        expected_value: expected.to_string(),
        action: RegistryAction::Set,
    }
}

pub fn registry_policy(id: &str, value_name: &str, expected: &str) -> PolicyDefinition {
    policy(
        id,
        MechanismDetails::Registry(registry_details(value_name, expected)),
    )
}

pub fn registry_delete_policy(id: &str, value_name: &str) -> PolicyDefinition {
    let mut details = registry_details(value_name, "");
    details.action = RegistryAction::Delete;
    policy(id, MechanismDetails::Registry(details))
}

pub fn service_policy(id: &str, service_name: &str, startup: ServiceStartupType) -> PolicyDefinition {
    policy(
        id,
        MechanismDetails::Service(ServiceDetails {
            service_name: service_name.to_string(),
            startup_type: startup,
            stop_service: false,
        }),
    )
}

pub fn task_policy(id: &str, task_path: &str, action: ScheduledTaskAction) -> PolicyDefinition {
    let mut p = policy(
        id,
        MechanismDetails::ScheduledTask(ScheduledTaskDetails {
            task_path: task_path.to_string(),
            action,
            export_directory: None,
        }),
    );
    p.reversible = action.is_reversible();
    p
}

pub fn firewall_rule(name: &str, address: &str) -> FirewallRule {
    FirewallRule {
        name: name.to_string(),
        direction: FirewallDirection::Outbound,
        action: FirewallAction::Block,
        protocol: FirewallProtocol::Any,
        remote_addresses: vec![address.to_string()],
        remote_ports: Vec::new(),
        program: None,
    }
}

pub fn firewall_rule_policy(id: &str, rule_name: &str, address: &str) -> PolicyDefinition {
    policy(
        id,
        MechanismDetails::Firewall(FirewallDetails::Rule(firewall_rule(rule_name, address))),
    )
}

pub fn endpoint_set_policy(id: &str, prefix: &str, endpoints: &[&str]) -> PolicyDefinition {
    policy(
        id,
        MechanismDetails::Firewall(FirewallDetails::EndpointSet(EndpointSet {
            rule_name_prefix: prefix.to_string(),
            direction: FirewallDirection::Outbound,
            action: FirewallAction::Block,
            protocol: FirewallProtocol::Any,
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            remote_ports: Vec::new(),
        })),
    )
}

pub fn script_policy(id: &str, apply: &str, verify: &str, expected: &str) -> PolicyDefinition {
    policy(
        id,
        MechanismDetails::Script(ScriptDetails {
            apply_command: apply.to_string(),
            revert_command: None,
            verify_command: verify.to_string(),
            expected_output: expected.to_string(),
        }),
    )
}

pub fn dependency(target: &str, dependency_type: DependencyType) -> PolicyDependency {
    PolicyDependency {
        policy_id: PolicyId::new(target),
        dependency_type,
        user_can_override: false,
        reason: String::new(),
    }
}

/// Add a `required` edge from `p` to each target.
pub fn requires(mut p: PolicyDefinition, targets: &[&str]) -> PolicyDefinition {
    for t in targets {
        p.dependencies.push(dependency(t, DependencyType::Required));
    }
    p
}

pub fn with_dependency(mut p: PolicyDefinition, dep: PolicyDependency) -> PolicyDefinition {
    p.dependencies.push(dep);
    p
}

pub fn with_builds(mut p: PolicyDefinition, min: Option<u32>, max: Option<u32>) -> PolicyDefinition {
    let app = p.applicability.get_or_insert_with(Applicability::default);
    app.min_build = min;
    app.max_build = max;
    p
}

pub fn with_category(mut p: PolicyDefinition, category: &str) -> PolicyDefinition {
    p.category = category.to_string();
    p
}
