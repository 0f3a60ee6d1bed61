//! Property tests for dependency resolution over random acyclic catalogs.

use crate::Catalog;
use crate::resolver::{resolve_dependencies, validate_graph};
use hardline_test_util::policies::{dependency, registry_policy, with_dependency};
use hardline_types::{DependencyType, PolicyId};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn node_id(i: usize) -> String {
    format!("p-{i:03}")
}

/// Edges only point from higher to lower indices, so the graph is always a DAG.
fn arb_dag() -> impl Strategy<Value = Vec<Vec<(usize, DependencyType)>>> {
    (2usize..24).prop_flat_map(|n| {
        let edge_type = prop_oneof![
            Just(DependencyType::Required),
            Just(DependencyType::Prerequisite),
            Just(DependencyType::Recommended),
            Just(DependencyType::Conflict),
        ];
        let per_node = (0..n)
            .map(move |i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec((0..i, edge_type.clone()), 0..4).boxed()
                }
            })
            .collect::<Vec<_>>();
        per_node
    })
}

fn build(edges: &[Vec<(usize, DependencyType)>]) -> Catalog {
    Catalog::from_validated(edges.iter().enumerate().map(|(i, deps)| {
        deps.iter().fold(
            registry_policy(&node_id(i), "V", "1"),
            |p, (target, kind)| with_dependency(p, dependency(&node_id(*target), *kind)),
        )
    }))
}

proptest! {
    #[test]
    fn mandatory_dependencies_precede_dependents(
        edges in arb_dag(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let catalog = build(&edges);
        let requested: Vec<PolicyId> = picks
            .iter()
            .map(|ix| PolicyId::new(node_id(ix.index(edges.len()))))
            .collect();

        let res = resolve_dependencies(&catalog, &requested).expect("DAG never cycles");
        let position: BTreeMap<&PolicyId, usize> =
            res.order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        prop_assert_eq!(position.len(), res.order.len(), "each id appears once");
        for id in &requested {
            prop_assert!(position.contains_key(id));
        }
        for id in &res.order {
            let policy = catalog.get(id).expect("ordered ids are known");
            for dep in policy.dependencies.iter().filter(|d| d.is_mandatory()) {
                let dep_pos = position.get(&dep.policy_id);
                prop_assert!(dep_pos.is_some(), "{} pulled in for {}", dep.policy_id, id);
                prop_assert!(dep_pos < position.get(id));
            }
        }
    }

    #[test]
    fn acyclic_catalogs_pass_graph_validation(edges in arb_dag()) {
        let catalog = build(&edges);
        prop_assert!(validate_graph(&catalog).is_ok());
    }

    #[test]
    fn resolution_is_deterministic(
        edges in arb_dag(),
        pick in any::<prop::sample::Index>(),
    ) {
        let catalog = build(&edges);
        let requested = vec![PolicyId::new(node_id(pick.index(edges.len())))];
        let a = resolve_dependencies(&catalog, &requested).expect("resolve");
        let b = resolve_dependencies(&catalog, &requested).expect("resolve");
        prop_assert_eq!(a, b);
    }
}
