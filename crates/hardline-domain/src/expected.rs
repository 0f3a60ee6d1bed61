//! What a compliant host looks like, per mechanism.
//!
//! These strings use the same format the executors report from `current_value`, so audit and
//! apply agree on what "compliant" means.

use crate::state_kv::format_state;
use hardline_types::{
    FirewallDetails, FirewallRule, MechanismDetails, RegistryAction, ScheduledTaskAction,
};

/// Current value reported for a registry value, service, task or rule that does not exist.
pub const NOT_PRESENT: &str = "(not present)";

pub fn expected_value(details: &MechanismDetails) -> String {
    match details {
        MechanismDetails::Registry(reg) => match reg.action {
            RegistryAction::Set => reg.expected_value.clone(),
            RegistryAction::Delete => NOT_PRESENT.to_string(),
        },
        MechanismDetails::Service(svc) => {
            let mut pairs = vec![("StartupType", svc.startup_type.as_str().to_string())];
            if svc.stop_service {
                pairs.push(("Running", false.to_string()));
            }
            format_state(&pairs)
        }
        MechanismDetails::ScheduledTask(task) => match task.action {
            ScheduledTaskAction::Disable | ScheduledTaskAction::Export => {
                format_state(&[("Enabled", false.to_string())])
            }
            ScheduledTaskAction::Delete => NOT_PRESENT.to_string(),
            ScheduledTaskAction::ModifyTriggers => {
                format_state(&[("TriggersEnabled", false.to_string())])
            }
        },
        MechanismDetails::Firewall(FirewallDetails::Rule(rule)) => rule_summary(rule),
        MechanismDetails::Firewall(FirewallDetails::EndpointSet(set)) => {
            endpoint_set_summary(set.endpoints.len(), set.endpoints.len(), &set.rule_name_prefix)
        }
        MechanismDetails::Script(script) => script.expected_output.trim().to_string(),
    }
}

/// One-line rendering of a rule's effective settings (the name is not included).
pub fn rule_summary(rule: &FirewallRule) -> String {
    let mut out = format!(
        "{} {} {}",
        rule.action.as_str(),
        rule.direction.as_str(),
        rule.protocol.as_str()
    );
    if !rule.remote_addresses.is_empty() {
        out.push_str(&format!(" remote={}", rule.remote_addresses.join(",")));
    }
    if !rule.remote_ports.is_empty() {
        out.push_str(&format!(" ports={}", rule.remote_ports.join(",")));
    }
    if let Some(program) = &rule.program {
        out.push_str(&format!(" program={program}"));
    }
    out
}

pub fn endpoint_set_summary(present: usize, total: usize, prefix: &str) -> String {
    format!("{present}/{total} rules present ({prefix})")
}
