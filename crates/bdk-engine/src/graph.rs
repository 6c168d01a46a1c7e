//! Dependency graph over package identities and cycle breaking.
//!
//! An edge `u -> v` means "u depends on v": v must be built before u.
//! Node names are normalized identities.

use std::collections::{BTreeMap, BTreeSet};
use std::iter::Flatten;
use std::option;

use bdk_config::{normalize_identity, Package};
use rayon::prelude::*;

use crate::error::EngineError;
use crate::executor::WorkerPool;

/// Directed dependency graph keyed by normalized identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no dependencies. Existing nodes are left untouched.
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(normalize_identity(name)).or_default();
    }

    /// Record that `from` depends on `to`, adding both nodes as needed.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let to = normalize_identity(to);
        self.edges.entry(to.clone()).or_default();
        self.edges
            .entry(normalize_identity(from))
            .or_default()
            .insert(to);
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.edges.contains_key(&normalize_identity(name))
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .get(&normalize_identity(from))
            .is_some_and(|deps| deps.contains(&normalize_identity(to)))
    }

    /// All nodes in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(&normalize_identity(name))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// All `(from, to)` edges in order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(from, deps)| deps.iter().map(move |to| (from.as_str(), to.as_str())))
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Strongly connected components, each sorted, in discovery order.
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        let component = Tarjan::run(&self.edges);
        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (node, id) in component {
            grouped.entry(id).or_default().push(node.to_owned());
        }
        grouped.into_values().collect()
    }

    /// Remove every edge that lies on a cycle and return the removed edges.
    ///
    /// An edge lies on some cycle exactly when both ends share a strongly
    /// connected component (self-loops included), so this removes the union
    /// of all cycle edges without enumerating the cycles themselves. The
    /// result is acyclic. Edges that also carried a real ordering constraint
    /// are removed along with the rest.
    pub fn break_cycles(&mut self) -> Vec<(String, String)> {
        let component: BTreeMap<String, usize> = Tarjan::run(&self.edges)
            .into_iter()
            .map(|(node, id)| (node.to_owned(), id))
            .collect();

        let mut removed = Vec::new();
        for (from, deps) in &mut self.edges {
            let from_component = component.get(from);
            deps.retain(|to| {
                let on_cycle = from_component.is_some() && component.get(to) == from_component;
                if on_cycle {
                    removed.push((from.clone(), to.clone()));
                }
                !on_cycle
            });
        }

        for (from, to) in &removed {
            tracing::warn!(%from, %to, "removed dependency edge on a cycle");
        }
        removed
    }

    /// Whether the graph has no cycles.
    pub fn is_acyclic(&self) -> bool {
        self.strongly_connected_components().iter().all(|c| c.len() == 1)
            && self.edges.iter().all(|(from, deps)| !deps.contains(from))
    }
}

type Children<'g> = Flatten<option::IntoIter<&'g BTreeSet<String>>>;

/// Iterative Tarjan SCC over the adjacency map.
struct Tarjan<'g> {
    graph: &'g BTreeMap<String, BTreeSet<String>>,
    index: BTreeMap<&'g str, usize>,
    low: BTreeMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: BTreeSet<&'g str>,
    component: BTreeMap<&'g str, usize>,
    next_index: usize,
    next_component: usize,
}

impl<'g> Tarjan<'g> {
    /// Map every node to the id of its strongly connected component.
    fn run(graph: &'g BTreeMap<String, BTreeSet<String>>) -> BTreeMap<&'g str, usize> {
        let mut state = Self {
            graph,
            index: BTreeMap::new(),
            low: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            component: BTreeMap::new(),
            next_index: 0,
            next_component: 0,
        };
        for node in graph.keys() {
            if !state.index.contains_key(node.as_str()) {
                state.visit(node);
            }
        }
        state.component
    }

    fn children(&self, node: &str) -> Children<'g> {
        self.graph.get(node).into_iter().flatten()
    }

    fn open(&mut self, node: &'g str) {
        self.index.insert(node, self.next_index);
        self.low.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);
    }

    fn lower(&mut self, node: &'g str, candidate: usize) {
        if let Some(low) = self.low.get_mut(node) {
            *low = (*low).min(candidate);
        }
    }

    fn visit(&mut self, root: &'g str) {
        self.open(root);
        let mut call: Vec<(&'g str, Children<'g>)> = vec![(root, self.children(root))];

        while let Some((node, children)) = call.last_mut() {
            let node = *node;
            if let Some(child) = children.next() {
                let child = child.as_str();
                if let Some(&child_index) = self.index.get(child) {
                    if self.on_stack.contains(child) {
                        self.lower(node, child_index);
                    }
                } else {
                    self.open(child);
                    let grandchildren = self.children(child);
                    call.push((child, grandchildren));
                }
                continue;
            }

            call.pop();
            let node_low = self.low.get(node).copied().unwrap_or(0);
            if let Some((parent, _)) = call.last() {
                let parent = *parent;
                self.lower(parent, node_low);
            }
            if Some(&node_low) == self.index.get(node) {
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(member);
                    self.component.insert(member, self.next_component);
                    if member == node {
                        break;
                    }
                }
                self.next_component += 1;
            }
        }
    }
}

/// Build the graph for `packages`, reading dependencies in parallel on `pool`.
///
/// Every package becomes a node. Dependency names outside the package set
/// still become nodes so that no edge is dropped.
///
/// # Errors
/// Returns the first error reported by `read_dependencies`.
pub fn build_graph<F>(
    packages: &[Package],
    pool: &WorkerPool,
    read_dependencies: F,
) -> Result<DependencyGraph, EngineError>
where
    F: Fn(&Package) -> Result<BTreeSet<String>, EngineError> + Sync,
{
    let resolved: Vec<(String, BTreeSet<String>)> = pool.install(|| {
        packages
            .par_iter()
            .map(|package| read_dependencies(package).map(|deps| (package.identity(), deps)))
            .collect::<Result<_, _>>()
    })?;

    let mut graph = DependencyGraph::new();
    for (identity, deps) in &resolved {
        graph.add_node(identity);
        for dep in deps {
            graph.add_edge(identity, dep);
        }
    }
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "dependency graph built"
    );
    Ok(graph)
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

    fn package(path: &str) -> Package {
        Package {
            path: path.to_owned(),
            filename: path.rsplit('/').next().unwrap().to_owned(),
            modified_time: OffsetDateTime::UNIX_EPOCH,
            status: PackageStatus::NeedsExport,
            is_excluded_by_rule: false,
            is_enabled: true,
            asset_directory: None,
        }
    }

    #[test]
    fn edges_are_normalized() {
        let g = graph(&[("Weapons", "ENGINE"), ("weapons", "Core")]);
        assert!(g.contains_edge("WEAPONS", "engine"));
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.dependencies("weapons").collect::<Vec<_>>(), vec!["core", "engine"]);
    }

    #[test]
    fn two_node_cycle_is_broken() {
        let mut g = graph(&[("a", "b"), ("b", "a"), ("c", "a")]);
        assert!(!g.is_acyclic());

        let removed = g.break_cycles();
        assert_eq!(
            removed,
            vec![("a".to_owned(), "b".to_owned()), ("b".to_owned(), "a".to_owned())]
        );
        assert!(g.is_acyclic());
        assert!(g.contains_edge("c", "a"));
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn self_loop_is_removed() {
        let mut g = graph(&[("a", "a"), ("a", "b")]);
        let removed = g.break_cycles();
        assert_eq!(removed, vec![("a".to_owned(), "a".to_owned())]);
        assert!(g.contains_edge("a", "b"));
        assert!(g.is_acyclic());
    }

    #[test]
    fn chord_inside_a_cycle_is_removed_too() {
        // a -> b -> c -> a plus chord a -> c: every edge is on some cycle.
        let mut g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("a", "c"), ("d", "c")]);
        let removed = g.break_cycles();
        assert_eq!(removed.len(), 4);
        assert_eq!(g.edge_count(), 1);
        assert!(g.contains_edge("d", "c"));
    }

    #[test]
    fn acyclic_graph_is_untouched() {
        let mut g = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let before = g.clone();
        assert!(g.break_cycles().is_empty());
        assert_eq!(g, before);
    }

    #[test]
    fn components_group_cycles() {
        let g = graph(&[("a", "b"), ("b", "a"), ("b", "c")]);
        let mut components = g.strongly_connected_components();
        components.sort();
        assert_eq!(
            components,
            vec![vec!["a".to_owned(), "b".to_owned()], vec!["c".to_owned()]]
        );
    }

    #[test]
    fn build_graph_reads_every_package() {
        let packages = vec![package("System/Engine.u"), package("Textures/Weapons.utx")];
        let pool = WorkerPool::new(2).unwrap();
        let g = build_graph(&packages, &pool, |p| {
            Ok(match p.identity().as_str() {
                "weapons" => ["Engine", "Core"].iter().map(|s| (*s).to_owned()).collect(),
                _ => BTreeSet::new(),
            })
        })
        .unwrap();
        assert!(g.contains_edge("weapons", "engine"));
        assert!(g.contains_node("core"));
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn build_graph_propagates_reader_errors() {
        let packages = vec![package("A.utx")];
        let pool = WorkerPool::new(1).unwrap();
        let result = build_graph(&packages, &pool, |_| {
            Err(EngineError::WorkerPool {
                message: "reader failed".to_owned(),
            })
        });
        assert!(result.is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn break_cycles_always_yields_acyclic(
                edges in proptest::collection::vec((0u8..12, 0u8..12), 0..60),
            ) {
                let mut g = DependencyGraph::new();
                for (from, to) in &edges {
                    g.add_edge(&format!("n{from}"), &format!("n{to}"));
                }
                let nodes_before = g.node_count();
                let edges_before = g.edge_count();
                let removed = g.break_cycles();

                prop_assert!(g.is_acyclic());
                prop_assert_eq!(g.node_count(), nodes_before);
                prop_assert_eq!(g.edge_count() + removed.len(), edges_before);
            }
        }
    }
}
