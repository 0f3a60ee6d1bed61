use crate::model::ProfileConfig;
use anyhow::Context;
use hardline_types::PolicyId;
use std::collections::BTreeSet;

/// A named, validated policy selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub description: String,
    /// Declaration order, duplicates removed.
    pub policies: Vec<PolicyId>,
}

pub(crate) fn build_profile(name: &str, cfg: &ProfileConfig) -> anyhow::Result<Profile> {
    if name.trim().is_empty() {
        anyhow::bail!("profile names must not be empty");
    }

    let mut seen = BTreeSet::new();
    let mut policies = Vec::new();
    for (i, raw) in cfg.policies.iter().enumerate() {
        let id = PolicyId::new(raw.as_str());
        if id.is_empty() {
            return Err(anyhow::anyhow!("entry {i} is blank"))
                .with_context(|| format!("invalid profile {name}"));
        }
        if seen.insert(id.clone()) {
            policies.push(id);
        }
    }

    Ok(Profile {
        name: name.to_string(),
        description: cfg.description.clone().unwrap_or_default(),
        policies,
    })
}
