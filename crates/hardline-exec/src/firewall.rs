use crate::host::FirewallHost;
use crate::record::{begin, fail, fail_host, succeed, wrong_mechanism};
use crate::{HostError, PolicyExecutor, Reversibility};
use hardline_domain::expected::{NOT_PRESENT, endpoint_set_summary, rule_summary};
use hardline_types::{
    ChangeRecord, EndpointSet, FailureKind, FirewallDetails, FirewallRule, Mechanism,
    MechanismDetails, Operation, PolicyDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const ABSENT: &str = "absent";

/// What an endpoint-set apply did, by rule name. Revert undoes exactly this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSetChange {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

pub struct FirewallExecutor {
    host: Arc<dyn FirewallHost>,
}

fn details(policy: &PolicyDefinition) -> Option<&FirewallDetails> {
    match &policy.mechanism {
        MechanismDetails::Firewall(d) => Some(d),
        _ => None,
    }
}

fn sorted_lower(values: &[String]) -> Vec<String> {
    let mut v: Vec<String> = values.iter().map(|s| s.trim().to_ascii_lowercase()).collect();
    v.sort();
    v
}

/// Rule equality as the firewall sees it: names case-insensitive, address and port lists unordered.
pub(crate) fn same_rule(a: &FirewallRule, b: &FirewallRule) -> bool {
    a.name.eq_ignore_ascii_case(&b.name)
        && a.direction == b.direction
        && a.action == b.action
        && a.protocol == b.protocol
        && sorted_lower(&a.remote_addresses) == sorted_lower(&b.remote_addresses)
        && sorted_lower(&a.remote_ports) == sorted_lower(&b.remote_ports)
        && a.program.as_deref().map(str::to_ascii_lowercase)
            == b.program.as_deref().map(str::to_ascii_lowercase)
}

/// `<prefix>-<digits>`; other rules that merely share the prefix are not ours.
fn is_managed_name(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn encode<T: Serialize>(value: &T) -> Result<String, HostError> {
    serde_json::to_string(value).map_err(|e| HostError::Failed(format!("encode state: {e}")))
}

impl FirewallExecutor {
    pub fn new(host: Arc<dyn FirewallHost>) -> Self {
        Self { host }
    }

    fn managed_rules(&self, set: &EndpointSet) -> Result<BTreeMap<String, FirewallRule>, HostError> {
        Ok(self
            .host
            .rules_with_prefix(&set.rule_name_prefix)?
            .into_iter()
            .filter(|r| is_managed_name(&set.rule_name_prefix, &r.name))
            .map(|r| (r.name.clone(), r))
            .collect())
    }

    fn apply_rule(&self, record: ChangeRecord, rule: &FirewallRule) -> ChangeRecord {
        let existing = match self.host.get_rule(&rule.name) {
            Ok(r) => r,
            Err(e) => return fail_host(record, None, &e),
        };
        let previous = match existing.as_ref().map(encode).transpose() {
            Ok(p) => p.unwrap_or_else(|| ABSENT.to_string()),
            Err(e) => return fail_host(record, None, &e),
        };
        if existing.as_ref().is_some_and(|r| same_rule(r, rule)) {
            return succeed(
                record,
                Some(previous.clone()),
                Some(previous),
                format!("Rule {} already matches; nothing to change", rule.name),
            );
        }
        if let Err(e) = self.host.upsert_rule(rule) {
            return fail_host(record, Some(previous), &e);
        }
        let verb = if existing.is_some() { "Updated" } else { "Created" };
        match encode(rule) {
            Ok(after) => succeed(
                record,
                Some(previous),
                Some(after),
                format!("{verb} rule {}: {}", rule.name, rule_summary(rule)),
            ),
            Err(e) => fail_host(record, Some(previous), &e),
        }
    }

    fn apply_set(&self, record: ChangeRecord, set: &EndpointSet) -> ChangeRecord {
        let existing = match self.managed_rules(set) {
            Ok(r) => r,
            Err(e) => return fail_host(record, None, &e),
        };
        let previous = match encode(&existing.values().collect::<Vec<_>>()) {
            Ok(p) => p,
            Err(e) => return fail_host(record, None, &e),
        };

        let wanted = set.rules();
        let mut change = EndpointSetChange::default();
        for rule in &wanted {
            match existing.get(&rule.name) {
                Some(live) if same_rule(live, rule) => continue,
                Some(_) => {
                    if let Err(e) = self.host.upsert_rule(rule) {
                        return self.fail_partial(record, previous, &existing, &change, &e);
                    }
                    change.updated.push(rule.name.clone());
                }
                None => {
                    if let Err(e) = self.host.upsert_rule(rule) {
                        return self.fail_partial(record, previous, &existing, &change, &e);
                    }
                    change.created.push(rule.name.clone());
                }
            }
        }
        for name in existing.keys() {
            if wanted.iter().any(|r| &r.name == name) {
                continue;
            }
            if let Err(e) = self.host.remove_rule(name) {
                return self.fail_partial(record, previous, &existing, &change, &e);
            }
            change.removed.push(name.clone());
        }

        let description = format!(
            "Endpoint set {}: {} created, {} updated, {} removed",
            set.rule_name_prefix,
            change.created.len(),
            change.updated.len(),
            change.removed.len()
        );
        match encode(&change) {
            Ok(after) => succeed(record, Some(previous), Some(after), description),
            Err(e) => fail_host(record, Some(previous), &e),
        }
    }

    /// Undo the rule changes made before `err`, so a failed record leaves the set as it was.
    fn fail_partial(
        &self,
        record: ChangeRecord,
        previous: String,
        existing: &BTreeMap<String, FirewallRule>,
        change: &EndpointSetChange,
        err: &HostError,
    ) -> ChangeRecord {
        let mut stranded = Vec::new();
        for name in &change.created {
            if let Err(e) = self.host.remove_rule(name) {
                tracing::error!(rule = %name, error = %e, "created rule left behind");
                stranded.push(name.as_str());
            }
        }
        for name in change.updated.iter().chain(&change.removed) {
            let Some(old) = existing.get(name) else {
                continue;
            };
            if let Err(e) = self.host.upsert_rule(old) {
                tracing::error!(rule = %name, error = %e, "rule not restored");
                stranded.push(name.as_str());
            }
        }
        let message = if stranded.is_empty() {
            err.to_string()
        } else {
            format!("{err}; rolling back also failed for [{}]", stranded.join(", "))
        };
        fail(record, Some(previous), err.failure_kind(), message)
    }

    fn revert_rule(
        &self,
        record: ChangeRecord,
        rule: &FirewallRule,
        original: &ChangeRecord,
    ) -> ChangeRecord {
        let Some(prior) = original.previous_state.as_deref() else {
            return fail(
                record,
                None,
                FailureKind::Execution,
                format!("change {} has no previous state", original.change_id),
            );
        };
        let before = match self.host.get_rule(&rule.name) {
            Ok(Some(r)) => encode(&r).unwrap_or_else(|_| rule.name.clone()),
            Ok(None) => ABSENT.to_string(),
            Err(e) => return fail_host(record, None, &e),
        };

        if prior == ABSENT {
            return match self.host.remove_rule(&rule.name) {
                Ok(_) => succeed(
                    record,
                    Some(before),
                    Some(ABSENT.to_string()),
                    format!("Removed rule {}, which did not exist before apply", rule.name),
                ),
                Err(e) => fail_host(record, Some(before), &e),
            };
        }

        let old: FirewallRule = match serde_json::from_str(prior) {
            Ok(r) => r,
            Err(e) => {
                return fail(
                    record,
                    Some(before),
                    FailureKind::Execution,
                    format!("change {} previous state is unreadable: {e}", original.change_id),
                );
            }
        };
        match self.host.upsert_rule(&old) {
            Ok(()) => succeed(
                record,
                Some(before),
                Some(prior.to_string()),
                format!("Restored rule {}: {}", old.name, rule_summary(&old)),
            ),
            Err(e) => fail_host(record, Some(before), &e),
        }
    }

    fn revert_set(
        &self,
        record: ChangeRecord,
        set: &EndpointSet,
        original: &ChangeRecord,
    ) -> ChangeRecord {
        let parsed = original
            .previous_state
            .as_deref()
            .map(serde_json::from_str::<Vec<FirewallRule>>)
            .zip(
                original
                    .new_state
                    .as_deref()
                    .map(serde_json::from_str::<EndpointSetChange>),
            );
        let (prior, change) = match parsed {
            Some((Ok(prior), Ok(change))) => (prior, change),
            _ => {
                return fail(
                    record,
                    None,
                    FailureKind::Execution,
                    format!("change {} has no usable endpoint-set state", original.change_id),
                );
            }
        };
        let prior: BTreeMap<&str, &FirewallRule> =
            prior.iter().map(|r| (r.name.as_str(), r)).collect();

        let mut removed = 0usize;
        let mut restored = 0usize;
        for name in &change.created {
            match self.host.remove_rule(name) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => return fail_host(record, None, &e),
            }
        }
        for name in change.updated.iter().chain(&change.removed) {
            let Some(old) = prior.get(name.as_str()) else {
                continue;
            };
            if let Err(e) = self.host.upsert_rule(old) {
                return fail_host(record, None, &e);
            }
            restored += 1;
        }

        succeed(
            record,
            original.new_state.clone(),
            original.previous_state.clone(),
            format!(
                "Endpoint set {}: removed {removed} created rule(s), restored {restored}",
                set.rule_name_prefix
            ),
        )
    }
}

impl PolicyExecutor for FirewallExecutor {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Firewall
    }

    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError> {
        match details(policy) {
            None => Ok(false),
            Some(FirewallDetails::Rule(rule)) => Ok(self
                .host
                .get_rule(&rule.name)?
                .is_some_and(|live| same_rule(&live, rule))),
            Some(FirewallDetails::EndpointSet(set)) => {
                let live = self.managed_rules(set)?;
                let wanted = set.rules();
                let all_present = wanted
                    .iter()
                    .all(|r| live.get(&r.name).is_some_and(|l| same_rule(l, r)));
                Ok(all_present && live.len() == wanted.len())
            }
        }
    }

    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError> {
        match details(policy) {
            None => Ok(NOT_PRESENT.to_string()),
            Some(FirewallDetails::Rule(rule)) => Ok(self
                .host
                .get_rule(&rule.name)?
                .map_or_else(|| NOT_PRESENT.to_string(), |r| rule_summary(&r))),
            Some(FirewallDetails::EndpointSet(set)) => {
                let live = self.managed_rules(set)?;
                let wanted = set.rules();
                let present = wanted
                    .iter()
                    .filter(|r| live.get(&r.name).is_some_and(|l| same_rule(l, r)))
                    .count();
                Ok(endpoint_set_summary(
                    present,
                    wanted.len(),
                    &set.rule_name_prefix,
                ))
            }
        }
    }

    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord {
        let record = begin(Operation::Apply, policy);
        match details(policy) {
            None => wrong_mechanism(record, "firewall"),
            Some(FirewallDetails::Rule(rule)) => self.apply_rule(record, rule),
            Some(FirewallDetails::EndpointSet(set)) => self.apply_set(record, set),
        }
    }

    fn revert(&self, policy: &PolicyDefinition, original: &ChangeRecord) -> ChangeRecord {
        let record = begin(Operation::Revert, policy);
        match details(policy) {
            None => wrong_mechanism(record, "firewall"),
            Some(FirewallDetails::Rule(rule)) => self.revert_rule(record, rule, original),
            Some(FirewallDetails::EndpointSet(set)) => self.revert_set(record, set, original),
        }
    }

    fn reversibility(&self, _policy: &PolicyDefinition) -> Reversibility {
        Reversibility::Reversible
    }
}

impl std::fmt::Debug for FirewallExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirewallExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFirewall;
    use hardline_test_util::policies::{endpoint_set_policy, firewall_rule, firewall_rule_policy};

    fn setup() -> (Arc<MemoryFirewall>, FirewallExecutor) {
        let host = Arc::new(MemoryFirewall::default());
        (host.clone(), FirewallExecutor::new(host))
    }

    #[test]
    fn managed_names_need_a_numeric_suffix() {
        assert!(is_managed_name("hl", "hl-001"));
        assert!(!is_managed_name("hl", "hl-extra"));
        assert!(!is_managed_name("hl", "hl-"));
        assert!(!is_managed_name("hl", "hl001"));
    }

    #[test]
    fn rule_apply_and_revert_removes_created_rule() {
        let (host, exec) = setup();
        let p = firewall_rule_policy("fw-002", "hardline-block-smb", "10.0.0.0/8");
        let applied = exec.apply(&p);
        assert!(applied.success, "{applied:?}");
        assert_eq!(applied.previous_state.as_deref(), Some(ABSENT));
        assert!(exec.is_applied(&p).expect("probe"));

        let reverted = exec.revert(&p, &applied);
        assert!(reverted.success, "{reverted:?}");
        assert!(host.rule("hardline-block-smb").is_none());
    }

    #[test]
    fn rule_revert_restores_a_replaced_rule() {
        let (host, exec) = setup();
        let original = firewall_rule("hardline-block-smb", "192.168.0.0/16");
        host.add(original.clone());
        let p = firewall_rule_policy("fw-002", "hardline-block-smb", "10.0.0.0/8");
        let applied = exec.apply(&p);
        assert!(applied.description.starts_with("Updated"), "{}", applied.description);
        exec.revert(&p, &applied);
        assert_eq!(host.rule("hardline-block-smb"), Some(original));
    }

    #[test]
    fn endpoint_set_revert_removes_only_what_apply_created() {
        let (host, exec) = setup();
        let stale = firewall_rule("hardline-telemetry-009", "203.0.113.9");
        let unrelated = firewall_rule("hardline-telemetry-notes", "203.0.113.10");
        host.add(stale.clone());
        host.add(unrelated.clone());

        let p = endpoint_set_policy("fw-001", "hardline-telemetry", &["a.example", "b.example"]);
        assert_eq!(
            exec.current_value(&p).expect("probe"),
            "0/2 rules present (hardline-telemetry)"
        );
        let applied = exec.apply(&p);
        assert!(applied.success, "{applied:?}");
        assert!(exec.is_applied(&p).expect("probe"));
        assert!(host.rule("hardline-telemetry-009").is_none());
        assert_eq!(host.rule("hardline-telemetry-notes"), Some(unrelated.clone()));

        let change: EndpointSetChange =
            serde_json::from_str(applied.new_state.as_deref().expect("state")).expect("json");
        assert_eq!(change.created, vec!["hardline-telemetry-001", "hardline-telemetry-002"]);
        assert_eq!(change.removed, vec!["hardline-telemetry-009"]);

        let reverted = exec.revert(&p, &applied);
        assert!(reverted.success, "{reverted:?}");
        assert!(host.rule("hardline-telemetry-001").is_none());
        assert!(host.rule("hardline-telemetry-002").is_none());
        assert_eq!(host.rule("hardline-telemetry-009"), Some(stale));
        assert_eq!(host.rule("hardline-telemetry-notes"), Some(unrelated));
    }

    #[test]
    fn failed_endpoint_set_apply_leaves_the_set_as_it_was() {
        let (host, exec) = setup();
        let stale = firewall_rule("hardline-telemetry-009", "203.0.113.9");
        host.add(stale.clone());
        host.fail("hardline-telemetry-009");

        let p = endpoint_set_policy("fw-001", "hardline-telemetry", &["a.example", "b.example"]);
        let applied = exec.apply(&p);

        assert!(!applied.success);
        assert!(host.rule("hardline-telemetry-001").is_none());
        assert!(host.rule("hardline-telemetry-002").is_none());
        assert_eq!(host.rule("hardline-telemetry-009"), Some(stale));
        assert_eq!(
            applied.error_message.as_deref(),
            Some("injected failure for hardline-telemetry-009")
        );
    }

    #[test]
    fn reapplying_a_complete_set_changes_nothing() {
        let (_host, exec) = setup();
        let p = endpoint_set_policy("fw-001", "hardline-telemetry", &["a.example"]);
        assert!(exec.apply(&p).success);
        let again = exec.apply(&p);
        let change: EndpointSetChange =
            serde_json::from_str(again.new_state.as_deref().expect("state")).expect("json");
        assert_eq!(change, EndpointSetChange::default());
    }
}
