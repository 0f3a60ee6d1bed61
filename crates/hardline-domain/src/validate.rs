//! Per-record validation. A bad record is excluded and reported; it never fails the whole load.

use crate::Catalog;
use hardline_types::{PolicyDefinition, PolicyId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("failed to parse policy document: {0}")]
    Parse(String),
    #[error("policy record has no policy_id")]
    MissingId,
    #[error("policy {0} has no name")]
    MissingName(PolicyId),
    #[error("policy {0} sets auto_apply; policies are only applied on explicit request")]
    AutoApply(PolicyId),
    #[error("policy id {0} is already defined by another document")]
    Duplicate(PolicyId),
}

/// A rejected record and where it came from (a path, or `<memory>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub source: String,
    pub error: ValidationError,
}

pub fn validate_record(p: &PolicyDefinition) -> Result<(), ValidationError> {
    if p.policy_id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    if p.name.trim().is_empty() {
        return Err(ValidationError::MissingName(p.policy_id.clone()));
    }
    if p.auto_apply {
        return Err(ValidationError::AutoApply(p.policy_id.clone()));
    }
    Ok(())
}

/// Validate records in order and build a catalog from the ones that pass.
///
/// The first record with a given id wins; later ones are reported as duplicates.
pub fn build_catalog<I>(records: I) -> (Catalog, Vec<ValidationIssue>)
where
    I: IntoIterator<Item = (String, PolicyDefinition)>,
{
    let mut seen: BTreeSet<PolicyId> = BTreeSet::new();
    let mut accepted = Vec::new();
    let mut issues = Vec::new();

    for (source, record) in records {
        if let Err(error) = validate_record(&record) {
            issues.push(ValidationIssue { source, error });
            continue;
        }
        if !seen.insert(record.policy_id.clone()) {
            issues.push(ValidationIssue {
                source,
                error: ValidationError::Duplicate(record.policy_id.clone()),
            });
            continue;
        }
        accepted.push(record);
    }

    (Catalog::from_validated(accepted), issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_test_util::policies::registry_policy;

    fn rec(source: &str, p: PolicyDefinition) -> (String, PolicyDefinition) {
        (source.to_string(), p)
    }

    #[test]
    fn malformed_records_are_excluded_without_failing_the_load() {
        let mut no_id = registry_policy("", "A", "1");
        no_id.name = "orphan".to_string();
        let mut no_name = registry_policy("p2", "B", "1");
        no_name.name = "  ".to_string();
        let mut auto = registry_policy("p3", "C", "1");
        auto.auto_apply = true;

        let (catalog, issues) = build_catalog(vec![
            rec("a.yaml", registry_policy("p1", "A", "1")),
            rec("b.yaml", no_id),
            rec("c.yaml", no_name),
            rec("d.yaml", auto),
            rec("e.yaml", registry_policy("p1", "Z", "9")),
        ]);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains(&PolicyId::new("p1")));
        let errors: Vec<ValidationError> = issues.iter().map(|i| i.error.clone()).collect();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingId,
                ValidationError::MissingName(PolicyId::new("p2")),
                ValidationError::AutoApply(PolicyId::new("p3")),
                ValidationError::Duplicate(PolicyId::new("p1")),
            ]
        );
        assert_eq!(issues[3].source, "e.yaml");
    }
}
