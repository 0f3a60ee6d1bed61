//! Merge user override fragments into mechanism details.
//!
//! A fragment is a JSON object of `MechanismDetails` fields. It is deep-merged into the serialized
//! details and the result is deserialized again, so an override can never produce a shape the
//! executors do not understand.

use crate::Catalog;
use hardline_types::{MechanismDetails, PolicyId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    #[error("override for {0} is not a JSON object")]
    NotAnObject(PolicyId),
    #[error("override for {policy_id} changes mechanism from {from} to {to}")]
    MechanismChange {
        policy_id: PolicyId,
        from: String,
        to: String,
    },
    #[error("override for {policy_id} produces invalid mechanism details: {message}")]
    Invalid { policy_id: PolicyId, message: String },
    #[error("override targets unknown policy {0}")]
    UnknownPolicy(PolicyId),
}

pub fn merge_override(
    policy_id: &PolicyId,
    details: &MechanismDetails,
    fragment: &Value,
) -> Result<MechanismDetails, OverrideError> {
    let Value::Object(patch) = fragment else {
        return Err(OverrideError::NotAnObject(policy_id.clone()));
    };

    let current = details.mechanism();
    if let Some(kind) = patch.get("type").and_then(Value::as_str)
        && kind != current.as_str()
    {
        return Err(OverrideError::MechanismChange {
            policy_id: policy_id.clone(),
            from: current.as_str().to_string(),
            to: kind.to_string(),
        });
    }

    let mut base = serde_json::to_value(details).map_err(|e| OverrideError::Invalid {
        policy_id: policy_id.clone(),
        message: e.to_string(),
    })?;
    if let Value::Object(target) = &mut base {
        merge_objects(target, patch);
    }

    serde_json::from_value(base).map_err(|e| OverrideError::Invalid {
        policy_id: policy_id.clone(),
        message: e.to_string(),
    })
}

fn merge_objects(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_objects(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Effective catalog: every valid override merged in. Invalid fragments are skipped and reported.
pub fn apply_overrides(
    catalog: &Catalog,
    overrides: &BTreeMap<PolicyId, Value>,
) -> (Catalog, Vec<OverrideError>) {
    let mut effective = catalog.clone();
    let mut issues = Vec::new();

    for (id, fragment) in overrides {
        let Some(policy) = catalog.get(id) else {
            issues.push(OverrideError::UnknownPolicy(id.clone()));
            continue;
        };
        match merge_override(id, &policy.mechanism, fragment) {
            Ok(mechanism) => {
                let mut merged = policy.clone();
                merged.mechanism = mechanism;
                effective = effective.with_replaced(merged);
            }
            Err(e) => issues.push(e),
        }
    }

    (effective, issues)
}

/// Later maps win per policy id.
pub fn layer_overrides(layers: &[&BTreeMap<PolicyId, Value>]) -> BTreeMap<PolicyId, Value> {
    let mut out = BTreeMap::new();
    for layer in layers {
        for (id, v) in *layer {
            out.insert(id.clone(), v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_test_util::policies::{endpoint_set_policy, registry_policy};
    use hardline_types::FirewallDetails;
    use serde_json::json;

    #[test]
    fn registry_value_can_be_overridden() {
        let catalog = Catalog::from_validated(vec![registry_policy("tel-001", "AllowTelemetry", "0")]);
        let overrides = BTreeMap::from([(PolicyId::new("tel-001"), json!({"expected_value": "1"}))]);
        let (effective, issues) = apply_overrides(&catalog, &overrides);
        assert!(issues.is_empty());
        let MechanismDetails::Registry(reg) = &effective.get(&PolicyId::new("tel-001")).expect("policy").mechanism
        else {
            panic!("registry");
        };
        assert_eq!(reg.expected_value, "1");
        assert_eq!(reg.value_name, "AllowTelemetry");
    }

    #[test]
    fn nested_firewall_fields_are_deep_merged() {
        let p = endpoint_set_policy("fw-1", "hl-block", &["1.1.1.1", "2.2.2.2"]);
        let id = PolicyId::new("fw-1");
        let merged = merge_override(
            &id,
            &p.mechanism,
            &json!({"endpoint_set": {"endpoints": ["3.3.3.3"]}}),
        )
        .expect("merge");
        let MechanismDetails::Firewall(FirewallDetails::EndpointSet(set)) = merged else {
            panic!("endpoint set");
        };
        assert_eq!(set.endpoints, vec!["3.3.3.3".to_string()]);
        assert_eq!(set.rule_name_prefix, "hl-block");
    }

    #[test]
    fn invalid_fragments_are_reported_and_skipped() {
        let catalog = Catalog::from_validated(vec![registry_policy("a", "A", "0")]);
        let overrides = BTreeMap::from([
            (PolicyId::new("a"), json!({"type": "service"})),
            (PolicyId::new("ghost"), json!({})),
        ]);
        let (effective, issues) = apply_overrides(&catalog, &overrides);
        assert_eq!(effective, catalog);
        assert_eq!(issues.len(), 2);
        assert!(matches!(issues[0], OverrideError::MechanismChange { .. }));
        assert!(matches!(issues[1], OverrideError::UnknownPolicy(_)));

        let err = merge_override(
            &PolicyId::new("a"),
            &catalog.get(&PolicyId::new("a")).expect("a").mechanism,
            &json!({"value_type": "not-a-type"}),
        )
        .expect_err("invalid");
        assert!(matches!(err, OverrideError::Invalid { .. }));
    }

    #[test]
    fn later_layers_win() {
        let persisted = BTreeMap::from([(PolicyId::new("a"), json!({"expected_value": "1"}))]);
        let request = BTreeMap::from([(PolicyId::new("a"), json!({"expected_value": "2"}))]);
        let layered = layer_overrides(&[&persisted, &request]);
        assert_eq!(layered[&PolicyId::new("a")], json!({"expected_value": "2"}));
    }
}
