//! Layered topological ordering of the dependency graph.

use std::collections::{BTreeMap, BTreeSet};

use bdk_config::Package;

use crate::error::EngineError;
use crate::graph::DependencyGraph;

/// Split an acyclic graph into build levels, leaves first.
///
/// Level 0 holds nodes without dependencies; every dependency of a node in
/// level `k` lies in a level below `k`. Each node appears exactly once.
///
/// # Errors
/// Returns [`EngineError::UnresolvedCycle`] if the graph still has a cycle.
pub fn layered_topological_sort(
    graph: &DependencyGraph,
) -> Result<Vec<BTreeSet<String>>, EngineError> {
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in graph.nodes() {
        pending.insert(node, graph.dependencies(node).count());
        for dep in graph.dependencies(node) {
            dependents.entry(dep).or_default().push(node);
        }
    }

    let mut current: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&node, _)| node)
        .collect();
    let mut levels = Vec::new();
    let mut placed = 0usize;

    while !current.is_empty() {
        let mut next = BTreeSet::new();
        for node in &current {
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        next.insert(*dependent);
                    }
                }
            }
        }
        placed += current.len();
        levels.push(current.iter().map(|n| (*n).to_owned()).collect());
        current = next;
    }

    if placed < graph.node_count() {
        let stuck: Vec<&str> = pending
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(&node, _)| node)
            .collect();
        return Err(EngineError::UnresolvedCycle {
            nodes: stuck.join(", "),
        });
    }
    Ok(levels)
}

/// Turn identity levels into batches of packages to build.
///
/// Each level is intersected with `to_build`; empty levels are dropped.
/// Packages whose identity is on no level are appended as a final batch.
pub fn materialize_levels<'p>(
    levels: &[BTreeSet<String>],
    to_build: &[&'p Package],
) -> Vec<Vec<&'p Package>> {
    let mut by_identity: BTreeMap<String, Vec<&'p Package>> = BTreeMap::new();
    for package in to_build {
        by_identity.entry(package.identity()).or_default().push(package);
    }

    let mut batches: Vec<Vec<&'p Package>> = levels
        .iter()
        .map(|level| {
            level
                .iter()
                .filter_map(|identity| by_identity.remove(identity))
                .flatten()
                .collect::<Vec<_>>()
        })
        .filter(|batch| !batch.is_empty())
        .collect();

    let orphans: Vec<&'p Package> = by_identity.into_values().flatten().collect();
    if !orphans.is_empty() {
        batches.push(orphans);
    }
    batches
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bdk_config::PackageStatus;
    use time::OffsetDateTime;

    use super::*;

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (from, to) in edges {
            g.add_edge(from, to);
        }
        g
    }

    fn level_of(levels: &[BTreeSet<String>], node: &str) -> usize {
        levels.iter().position(|l| l.contains(node)).unwrap()
    }

    fn package(path: &str) -> Package {
        Package {
            path: path.to_owned(),
            filename: path.rsplit('/').next().unwrap().to_owned(),
            modified_time: OffsetDateTime::UNIX_EPOCH,
            status: PackageStatus::NeedsBuild,
            is_excluded_by_rule: false,
            is_enabled: true,
            asset_directory: None,
        }
    }

    #[test]
    fn diamond_orders_levels() {
        let g = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let levels = layered_topological_sort(&g).unwrap();
        assert_eq!(levels.len(), 3);
        assert!(level_of(&levels, "d") < level_of(&levels, "b"));
        assert_eq!(level_of(&levels, "b"), level_of(&levels, "c"));
        assert!(level_of(&levels, "c") < level_of(&levels, "a"));
    }

    #[test]
    fn independent_nodes_share_level_zero() {
        let mut g = DependencyGraph::new();
        g.add_node("x");
        g.add_node("y");
        let levels = layered_topological_sort(&g).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels.first().unwrap().len(), 2);
    }

    #[test]
    fn empty_graph_has_no_levels() {
        assert!(layered_topological_sort(&DependencyGraph::new()).unwrap().is_empty());
    }

    #[test]
    fn cycle_is_rejected_until_broken() {
        let mut g = graph(&[("a", "b"), ("b", "a"), ("c", "d")]);
        let err = layered_topological_sort(&g).unwrap_err();
        assert!(
            matches!(&err, EngineError::UnresolvedCycle { nodes } if nodes == "a, b"),
            "got {err}"
        );

        g.break_cycles();
        let levels = layered_topological_sort(&g).unwrap();
        let total: usize = levels.iter().map(BTreeSet::len).sum();
        assert_eq!(total, 4);
        for node in ["a", "b", "c", "d"] {
            assert_eq!(levels.iter().filter(|l| l.contains(node)).count(), 1);
        }
    }

    #[test]
    fn materialize_intersects_and_drops_empty_levels() {
        let g = graph(&[("weapons", "engine"), ("engine", "core"), ("armor", "core")]);
        let levels = layered_topological_sort(&g).unwrap();
        let weapons = package("Textures/Weapons.utx");
        let armor = package("Textures/Armor.utx");
        let stray = package("Sounds/Stray.uax");

        let batches = materialize_levels(&levels, &[&weapons, &armor, &stray]);
        let names: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.iter().map(|p| p.filename.as_str()).collect())
            .collect();
        assert_eq!(
            names,
            vec![vec!["Armor.utx"], vec!["Weapons.utx"], vec!["Stray.uax"]]
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_node_placed_once_after_its_dependencies(
                edges in proptest::collection::vec((1u8..20, 0u8..20), 0..80),
            ) {
                // Only point edges at lower-numbered nodes so the graph is a DAG.
                let mut g = DependencyGraph::new();
                for (from, to) in &edges {
                    let to = to % from;
                    g.add_edge(&format!("n{from}"), &format!("n{to}"));
                }
                let levels = layered_topological_sort(&g).unwrap();

                for node in g.nodes() {
                    prop_assert_eq!(levels.iter().filter(|l| l.contains(node)).count(), 1);
                }
                for (from, to) in g.edges() {
                    prop_assert!(level_of(&levels, to) < level_of(&levels, from));
                }
            }
        }
    }
}
