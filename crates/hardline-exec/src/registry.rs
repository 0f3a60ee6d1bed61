use crate::host::{RegistryHost, RegistryValue};
use crate::record::{begin, fail, fail_host, succeed, wrong_mechanism};
use crate::{HostError, PolicyExecutor, Reversibility};
use hardline_domain::expected::NOT_PRESENT;
use hardline_types::{
    ChangeRecord, FailureKind, Mechanism, MechanismDetails, Operation, PolicyDefinition,
    RegistryAction, RegistryDetails, RegistryValueType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized registry state: whether the value existed, and if so its exact type and data.
///
/// `exists: false` is what lets a revert delete a value that apply created instead of writing an
/// empty one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RegistryState {
    fn absent() -> Self {
        Self {
            exists: false,
            value_type: None,
            data: None,
        }
    }

    fn of(value: Option<&RegistryValue>) -> Self {
        match value {
            None => Self::absent(),
            Some(v) => Self {
                exists: true,
                value_type: Some(v.value_type.reg_name().to_string()),
                data: Some(v.data.clone()),
            },
        }
    }

    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"exists":false}"#.to_string())
    }

    pub fn decode(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

pub struct RegistryExecutor {
    host: Arc<dyn RegistryHost>,
}

impl RegistryExecutor {
    pub fn new(host: Arc<dyn RegistryHost>) -> Self {
        Self { host }
    }

    fn read(&self, d: &RegistryDetails) -> Result<Option<RegistryValue>, HostError> {
        self.host.get_value(d.hive, &d.key_path, &d.value_name)
    }

    fn target(d: &RegistryDetails) -> String {
        format!("{}\\{}", d.full_key(), d.value_name)
    }
}

fn details(policy: &PolicyDefinition) -> Option<&RegistryDetails> {
    match &policy.mechanism {
        MechanismDetails::Registry(d) => Some(d),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse::<u64>().ok(),
    }
}

/// Numeric types compare by value (`0x1` equals `1`); binary compares case-insensitively.
pub(crate) fn values_match(value_type: RegistryValueType, actual: &str, expected: &str) -> bool {
    match value_type {
        RegistryValueType::Dword | RegistryValueType::Qword => {
            match (parse_number(actual), parse_number(expected)) {
                (Some(a), Some(e)) => a == e,
                _ => actual.trim() == expected.trim(),
            }
        }
        RegistryValueType::Binary => actual.trim().eq_ignore_ascii_case(expected.trim()),
        RegistryValueType::String
        | RegistryValueType::ExpandString
        | RegistryValueType::MultiString => actual == expected,
    }
}

impl PolicyExecutor for RegistryExecutor {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Registry
    }

    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError> {
        let Some(d) = details(policy) else {
            return Ok(false);
        };
        let current = self.read(d)?;
        Ok(match d.action {
            RegistryAction::Set => current.is_some_and(|v| {
                v.value_type == d.value_type && values_match(d.value_type, &v.data, &d.expected_value)
            }),
            RegistryAction::Delete => current.is_none(),
        })
    }

    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError> {
        let Some(d) = details(policy) else {
            return Ok(NOT_PRESENT.to_string());
        };
        Ok(self
            .read(d)?
            .map_or_else(|| NOT_PRESENT.to_string(), |v| v.data))
    }

    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord {
        let record = begin(Operation::Apply, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "registry");
        };
        let target = Self::target(d);

        let before = match self.read(d) {
            Ok(v) => v,
            Err(e) => return fail_host(record, None, &e),
        };
        let previous = RegistryState::of(before.as_ref()).encode();

        match d.action {
            RegistryAction::Set => {
                let value = RegistryValue {
                    value_type: d.value_type,
                    data: d.expected_value.clone(),
                };
                if let Err(e) = self.host.set_value(d.hive, &d.key_path, &d.value_name, &value) {
                    return fail_host(record, Some(previous), &e);
                }
                let after = RegistryState::of(Some(&value)).encode();
                succeed(
                    record,
                    Some(previous),
                    Some(after),
                    format!(
                        "Set {target} to {} ({})",
                        d.expected_value,
                        d.value_type.reg_name()
                    ),
                )
            }
            RegistryAction::Delete => {
                if before.is_none() {
                    return succeed(
                        record,
                        Some(previous.clone()),
                        Some(previous),
                        format!("{target} not present; nothing to delete"),
                    );
                }
                match self.host.delete_value(d.hive, &d.key_path, &d.value_name) {
                    Ok(_) => succeed(
                        record,
                        Some(previous),
                        Some(RegistryState::absent().encode()),
                        format!("Deleted {target}"),
                    ),
                    Err(e) => fail_host(record, Some(previous), &e),
                }
            }
        }
    }

    fn revert(&self, policy: &PolicyDefinition, original: &ChangeRecord) -> ChangeRecord {
        let record = begin(Operation::Revert, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "registry");
        };
        let target = Self::target(d);

        let Some(prior) = original.previous_state.as_deref().and_then(RegistryState::decode) else {
            return fail(
                record,
                None,
                FailureKind::Execution,
                format!("change {} has no usable previous state", original.change_id),
            );
        };

        let before = match self.read(d) {
            Ok(v) => RegistryState::of(v.as_ref()).encode(),
            Err(e) => return fail_host(record, None, &e),
        };

        if !prior.exists {
            return match self.host.delete_value(d.hive, &d.key_path, &d.value_name) {
                Ok(true) => succeed(
                    record,
                    Some(before),
                    Some(RegistryState::absent().encode()),
                    format!("Removed {target}, which did not exist before apply"),
                ),
                Ok(false) => succeed(
                    record,
                    Some(before),
                    Some(RegistryState::absent().encode()),
                    format!("{target} already absent; nothing to remove"),
                ),
                Err(e) => fail_host(record, Some(before), &e),
            };
        }

        let value_type = prior
            .value_type
            .as_deref()
            .and_then(RegistryValueType::from_reg_name)
            .unwrap_or(d.value_type);
        let value = RegistryValue {
            value_type,
            data: prior.data.clone().unwrap_or_default(),
        };
        match self.host.set_value(d.hive, &d.key_path, &d.value_name, &value) {
            Ok(()) => succeed(
                record,
                Some(before),
                Some(RegistryState::of(Some(&value)).encode()),
                format!("Restored {target} to {} ({})", value.data, value_type.reg_name()),
            ),
            Err(e) => fail_host(record, Some(before), &e),
        }
    }

    fn reversibility(&self, _policy: &PolicyDefinition) -> Reversibility {
        Reversibility::Reversible
    }
}

impl std::fmt::Debug for RegistryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryExecutor").finish_non_exhaustive()
    }
}
