//! Lexicographic breadth-first search, used to find a perfect elimination ordering.
//!
//! Life-interval interference graphs are interval graphs, a subclass of chordal graphs:
//! Lex-BFS produces a perfect elimination ordering for any chordal graph, and coloring nodes
//! in the *reverse* of that ordering (greedily, each node sees only already-colored earlier
//! neighbors) never needs more colors than the graph's clique number -- which for an
//! interval graph equals the maximum number of simultaneously live values, i.e. the minimum
//! physical register count that could possibly suffice.

use crate::ir::InstId;
use crate::regalloc::interference_graph::InterferenceGraph;
use std::collections::{HashMap, HashSet};

/// Compute a Lex-BFS perfect elimination ordering of `graph`'s nodes.
///
/// Returns the ordering as a `Vec<InstId>` in visit order; reverse it to get the elimination
/// order the coloring pass should assign colors in.
pub fn lex_bfs_order(graph: &InterferenceGraph) -> Vec<InstId> {
    let mut unvisited: HashSet<InstId> = graph.values().collect();
    // Each partition carries a label; we start with a single partition containing all
    // vertices, labeled with an empty sequence, and refine it by splitting on each visited
    // vertex's neighbors.
    let mut labels: HashMap<InstId, Vec<u32>> = unvisited.iter().map(|&v| (v, Vec::new())).collect();
    let mut order = Vec::with_capacity(unvisited.len());
    let mut step: u32 = unvisited.len() as u32;

    while !unvisited.is_empty() {
        // Pick the vertex with lexicographically largest label (ties broken by any stable
        // rule; InstId's Ord is used to keep this deterministic).
        let next = *unvisited
            .iter()
            .max_by(|&&a, &&b| {
                labels[&a]
                    .cmp(&labels[&b])
                    .then_with(|| a.cmp(&b))
            })
            .unwrap();
        unvisited.remove(&next);
        order.push(next);

        if let Some(node) = graph.node(next) {
            for &neighbor in &node.interferes_with {
                if unvisited.contains(&neighbor) {
                    labels.get_mut(&neighbor).unwrap().push(step);
                }
            }
        }
        step -= 1;
    }

    order
}
