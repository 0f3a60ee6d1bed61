//! Drift detection: re-probe a baseline's expected states against the live host.

use hardline_domain::drift::{ExpectedState, compare};
use hardline_domain::{Catalog, check_compatibility};
use hardline_exec::ExecutorSet;
use hardline_types::{DriftItem, ErrorInfo, SystemInfo, ids};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriftReport {
    /// Rows that were actually probed.
    pub checked: u32,
    pub items: Vec<DriftItem>,
    /// Rows that could not be checked: unknown, inapplicable, or unprobeable policies.
    pub warnings: Vec<ErrorInfo>,
}

/// Probe every expected row through its executor and collect the disagreements.
pub fn detect_drift(
    expected: &[ExpectedState],
    catalog: &Catalog,
    system: &SystemInfo,
    executors: &ExecutorSet,
) -> DriftReport {
    let mut report = DriftReport::default();

    for row in expected {
        let Some(policy) = catalog.get(&row.policy_id) else {
            report.warnings.push(ErrorInfo::for_policy(
                ids::CODE_NOT_FOUND,
                &row.policy_id,
                "policy is in the baseline but no longer in the catalog",
            ));
            continue;
        };
        if let Some(reason) = check_compatibility(policy, system).reason() {
            report.warnings.push(ErrorInfo::for_policy(
                ids::CODE_NOT_APPLICABLE,
                &row.policy_id,
                format!("not checked: {reason}"),
            ));
            continue;
        }

        let exec = executors.for_policy(policy);
        let actual = exec
            .is_applied(policy)
            .map(|applied| (applied, exec.current_value(policy).ok()));
        match actual {
            Ok((applied, value)) => {
                report.checked += 1;
                if let Some(item) = compare(row, &policy.name, applied, value) {
                    tracing::info!(
                        policy_id = %item.policy_id,
                        expected = item.expected_applied,
                        actual = item.actual_applied,
                        "drift detected"
                    );
                    report.items.push(item);
                }
            }
            Err(e) => report.warnings.push(ErrorInfo::for_policy(
                e.failure_kind().error_code(),
                &row.policy_id,
                format!("probe failed: {e}"),
            )),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_exec::RegistryValue;
    use hardline_exec::memory::MemoryHost;
    use hardline_test_util::policies::{TEST_KEY_PATH, registry_policy, with_builds};
    use hardline_types::{PolicyId, RegistryHive, RegistryValueType};

    fn row(id: &str, is_applied: bool) -> ExpectedState {
        ExpectedState {
            policy_id: PolicyId::new(id),
            is_applied,
            value: None,
        }
    }

    fn system() -> SystemInfo {
        SystemInfo {
            windows_build: 22631,
            sku: "Professional".to_string(),
            os_version: String::new(),
        }
    }

    #[test]
    fn one_flipped_policy_is_one_drift_item() {
        let host = MemoryHost::new();
        host.registry.insert(
            RegistryHive::LocalMachine,
            TEST_KEY_PATH,
            "B",
            RegistryValue {
                value_type: RegistryValueType::Dword,
                data: "0".to_string(),
            },
        );
        let catalog = Catalog::from_validated([
            registry_policy("p1", "A", "0"),
            registry_policy("p2", "B", "0"),
        ]);
        let executors = ExecutorSet::new(host.hosts());

        let report = detect_drift(
            &[row("p1", true), row("p2", true)],
            &catalog,
            &system(),
            &executors,
        );

        assert_eq!(report.checked, 2);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].policy_id.as_str(), "p1");
        assert!(report.items[0].expected_applied);
        assert!(!report.items[0].actual_applied);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unknown_and_inapplicable_rows_are_warnings() {
        let host = MemoryHost::new();
        let catalog = Catalog::from_validated([with_builds(
            registry_policy("future", "A", "0"),
            Some(99999),
            None,
        )]);
        let executors = ExecutorSet::new(host.hosts());

        let report = detect_drift(
            &[row("gone", true), row("future", true)],
            &catalog,
            &system(),
            &executors,
        );

        assert_eq!(report.checked, 0);
        assert!(report.items.is_empty());
        let codes: Vec<&str> = report.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec![ids::CODE_NOT_FOUND, ids::CODE_NOT_APPLICABLE]);
    }
}
