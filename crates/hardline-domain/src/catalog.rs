use hardline_types::{PolicyDefinition, PolicyId};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Immutable, id-keyed set of validated policy definitions.
///
/// Catalogs are never edited after construction; a reload or an override merge produces a new one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    policies: BTreeMap<PolicyId, PolicyDefinition>,
}

impl Catalog {
    /// Build from already-validated definitions. Later duplicates are ignored; use
    /// [`crate::build_catalog`] to get them reported.
    pub fn from_validated<I: IntoIterator<Item = PolicyDefinition>>(policies: I) -> Self {
        let mut map = BTreeMap::new();
        for p in policies {
            map.entry(p.policy_id.clone()).or_insert(p);
        }
        Self { policies: map }
    }

    pub fn get(&self, id: &PolicyId) -> Option<&PolicyDefinition> {
        self.policies.get(id)
    }

    pub fn contains(&self, id: &PolicyId) -> bool {
        self.policies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies in id order.
    pub fn iter(&self) -> impl Iterator<Item = &PolicyDefinition> {
        self.policies.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PolicyId> {
        self.policies.keys()
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a PolicyDefinition> {
        self.policies
            .values()
            .filter(move |p| p.category.eq_ignore_ascii_case(category))
    }

    /// Copy of this catalog with `policy` replacing the definition of the same id.
    pub fn with_replaced(&self, policy: PolicyDefinition) -> Catalog {
        let mut policies = self.policies.clone();
        policies.insert(policy.policy_id.clone(), policy);
        Catalog { policies }
    }

    /// Stable SHA-256 over the canonical JSON of every definition, in id order.
    ///
    /// Snapshots record it so a baseline can be matched to the catalog it was taken against.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for p in self.policies.values() {
            let canonical = serde_json::to_vec(p).unwrap_or_default();
            hasher.update(p.policy_id.as_str().as_bytes());
            hasher.update(b"|");
            hasher.update(&canonical);
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
