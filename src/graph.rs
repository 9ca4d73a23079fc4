//! Dependency graph analysis
//!
//! Directed graph from feature id to declared dependency ids, with
//! deterministic cycle extraction. Traversal uses an explicit stack and a
//! per-node state arena, so arbitrarily deep dependency chains cannot
//! overflow the call stack.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};

/// Dependency graph over a record collection.
///
/// Edges point from a record to each declared dependency that exists in the
/// collection. References to ids that are not present are skipped here;
/// missing references are a separate validation finding.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    indices: BTreeMap<String, NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Build a graph from `(id, dependencies)` entries. Entries sharing an
    /// id collapse into one node carrying the union of their edges.
    pub fn new(entries: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut deps_by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, deps) in entries {
            deps_by_id.entry(id).or_default().extend(deps);
        }

        let mut graph = DiGraph::with_capacity(deps_by_id.len(), deps_by_id.len());
        let mut indices = BTreeMap::new();
        for id in deps_by_id.keys() {
            indices.insert(id.clone(), graph.add_node(id.clone()));
        }
        for (id, deps) in &deps_by_id {
            if let Some(&from) = indices.get(id) {
                for dep in deps {
                    if let Some(&to) = indices.get(dep) {
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }

        Self { graph, indices }
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every dependency cycle, each listed in traversal order starting at
    /// the node where the cycle was closed. Cycles reachable from several
    /// entry points are reported once, keyed by their canonical rotation.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut adjacency: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.graph.node_count()];
        for &idx in self.indices.values() {
            let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
            neighbors.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            adjacency[idx.index()] = neighbors;
        }

        let mut states = vec![NodeState::Unvisited; self.graph.node_count()];
        let mut seen = BTreeSet::new();
        let mut cycles = Vec::new();

        // Roots in sorted id order keeps reports stable across runs
        for &root in self.indices.values() {
            if states[root.index()] != NodeState::Unvisited {
                continue;
            }

            // Frame: (node, cursor into its adjacency list)
            let mut stack: Vec<(NodeIndex, usize)> = vec![(root, 0)];
            let mut path: Vec<NodeIndex> = vec![root];
            states[root.index()] = NodeState::OnStack;

            while let Some(&(node, cursor)) = stack.last() {
                let neighbors = &adjacency[node.index()];
                if cursor < neighbors.len() {
                    let next = neighbors[cursor];
                    if let Some(frame) = stack.last_mut() {
                        frame.1 += 1;
                    }
                    match states[next.index()] {
                        NodeState::Unvisited => {
                            states[next.index()] = NodeState::OnStack;
                            stack.push((next, 0));
                            path.push(next);
                        }
                        NodeState::OnStack => {
                            // Back edge: the cycle is the path suffix from
                            // the revisited node
                            if let Some(pos) = path.iter().position(|&n| n == next) {
                                let members: Vec<String> =
                                    path[pos..].iter().map(|&n| self.graph[n].clone()).collect();
                                if seen.insert(canonical_key(&members)) {
                                    cycles.push(members);
                                }
                            }
                        }
                        NodeState::Done => {}
                    }
                } else {
                    states[node.index()] = NodeState::Done;
                    stack.pop();
                    path.pop();
                }
            }
        }

        cycles
    }
}

/// Rotation-independent key for a cycle's member list
fn canonical_key(members: &[String]) -> String {
    let n = members.len();
    (0..n)
        .map(|shift| {
            (0..n)
                .map(|i| members[(shift + i) % n].as_str())
                .collect::<Vec<_>>()
                .join("->")
        })
        .min()
        .unwrap_or_default()
}

/// Render a cycle for reporting: members in traversal order, closed by
/// repeating the first id.
pub fn format_cycle(members: &[String]) -> String {
    let mut parts: Vec<&str> = members.iter().map(String::as_str).collect();
    if let Some(first) = members.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}
