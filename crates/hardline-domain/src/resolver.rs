//! Dependency ordering and catalog-wide graph validation.
//!
//! Both walks follow the same edges: `required` and `prerequisite` always, `recommended` only when
//! the user cannot override it. `conflict` edges are reported and never followed.

use crate::Catalog;
use hardline_types::{DependencyType, PolicyId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Visiting,
    Done,
}

/// A mandatory edge whose target is not in the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingDependency {
    pub policy_id: PolicyId,
    pub target: PolicyId,
    pub dependency_type: DependencyType,
}

/// Two policies in the same plan that declare a conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictPair {
    pub policy_id: PolicyId,
    pub conflicts_with: PolicyId,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Dependencies before dependents; each id once.
    pub order: Vec<PolicyId>,
    /// Ids in `order` that were pulled in by an edge rather than requested.
    pub added: Vec<PolicyId>,
    /// Requested ids the catalog does not know.
    pub unknown: Vec<PolicyId>,
    pub missing: Vec<MissingDependency>,
    pub conflicts: Vec<ConflictPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("dependency cycle: {}", render_chain(.path))]
    Cycle { path: Vec<PolicyId> },
}

/// Every distinct mandatory cycle in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("policy catalog has {} dependency cycle(s): {}", .cycles.len(), render_cycles(.cycles))]
pub struct GraphError {
    /// Each cycle starts and ends on its smallest id, e.g. `[a, b, a]`.
    pub cycles: Vec<Vec<PolicyId>>,
}

/// Non-fatal findings from a successful graph validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphReport {
    pub missing: Vec<MissingDependency>,
}

pub fn render_chain(path: &[PolicyId]) -> String {
    path.iter()
        .map(PolicyId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_cycles(cycles: &[Vec<PolicyId>]) -> String {
    cycles
        .iter()
        .map(|c| render_chain(c))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Order `requested` and everything it mandatorily depends on.
pub fn resolve_dependencies(
    catalog: &Catalog,
    requested: &[PolicyId],
) -> Result<Resolution, ResolveError> {
    let mut walk = Walk::new(catalog);
    let mut unknown = Vec::new();

    for id in requested {
        if !catalog.contains(id) {
            if !unknown.contains(id) {
                unknown.push(id.clone());
            }
            continue;
        }
        walk.visit(id)?;
    }

    let requested_set: BTreeSet<&PolicyId> = requested.iter().collect();
    let added = walk
        .order
        .iter()
        .filter(|id| !requested_set.contains(id))
        .cloned()
        .collect();

    let in_plan: BTreeSet<&PolicyId> = walk.order.iter().collect();
    let mut conflicts = Vec::new();
    for id in &walk.order {
        let Some(policy) = catalog.get(id) else {
            continue;
        };
        for dep in &policy.dependencies {
            if dep.dependency_type == DependencyType::Conflict && in_plan.contains(&dep.policy_id) {
                conflicts.push(ConflictPair {
                    policy_id: id.clone(),
                    conflicts_with: dep.policy_id.clone(),
                    reason: dep.reason.clone(),
                });
            }
        }
    }

    Ok(Resolution {
        order: walk.order,
        added,
        unknown,
        missing: walk.missing,
        conflicts,
    })
}

/// Walk every policy and collect all distinct mandatory cycles into one error.
pub fn validate_graph(catalog: &Catalog) -> Result<GraphReport, GraphError> {
    let mut walk = Walk::new(catalog);
    walk.collect_cycles = true;

    for id in catalog.ids() {
        // Cycles are collected, not returned, in this mode.
        let _ = walk.visit(id);
    }

    if walk.cycles.is_empty() {
        Ok(GraphReport {
            missing: walk.missing,
        })
    } else {
        Err(GraphError {
            cycles: walk.cycles.into_iter().collect(),
        })
    }
}

struct Walk<'a> {
    catalog: &'a Catalog,
    colors: BTreeMap<PolicyId, Color>,
    stack: Vec<PolicyId>,
    order: Vec<PolicyId>,
    missing: Vec<MissingDependency>,
    collect_cycles: bool,
    cycles: BTreeSet<Vec<PolicyId>>,
}

impl<'a> Walk<'a> {
    fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            colors: BTreeMap::new(),
            stack: Vec::new(),
            order: Vec::new(),
            missing: Vec::new(),
            collect_cycles: false,
            cycles: BTreeSet::new(),
        }
    }

    fn visit(&mut self, id: &PolicyId) -> Result<(), ResolveError> {
        match self.colors.get(id) {
            Some(Color::Done) => return Ok(()),
            Some(Color::Visiting) => {
                let start = self.stack.iter().position(|s| s == id).unwrap_or(0);
                let mut path: Vec<PolicyId> = self.stack[start..].to_vec();
                path.push(id.clone());
                if self.collect_cycles {
                    self.cycles.insert(canonical_cycle(&path));
                    return Ok(());
                }
                return Err(ResolveError::Cycle { path });
            }
            None => {}
        }

        let Some(policy) = self.catalog.get(id) else {
            return Ok(());
        };

        self.colors.insert(id.clone(), Color::Visiting);
        self.stack.push(id.clone());

        for dep in &policy.dependencies {
            if !dep.is_mandatory() {
                continue;
            }
            if !self.catalog.contains(&dep.policy_id) {
                let missing = MissingDependency {
                    policy_id: id.clone(),
                    target: dep.policy_id.clone(),
                    dependency_type: dep.dependency_type,
                };
                if !self.missing.contains(&missing) {
                    self.missing.push(missing);
                }
                continue;
            }
            self.visit(&dep.policy_id)?;
        }

        self.stack.pop();
        self.colors.insert(id.clone(), Color::Done);
        self.order.push(id.clone());
        Ok(())
    }
}

/// Rotate a closed path so it starts (and ends) on its smallest id.
fn canonical_cycle(closed: &[PolicyId]) -> Vec<PolicyId> {
    let open = &closed[..closed.len().saturating_sub(1)];
    if open.is_empty() {
        return closed.to_vec();
    }
    let min_at = open
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated: Vec<PolicyId> = open[min_at..]
        .iter()
        .chain(open[..min_at].iter())
        .cloned()
        .collect();
    rotated.push(rotated[0].clone());
    rotated
}
