//! Second coloring pass: pack spilled values into a minimal set of stack slots.
//!
//! Spilled values still have life intervals and still interfere with each other exactly as
//! they did in register allocation; the only difference is the "palette" is unbounded (the
//! frame can always grow by one more slot), so this reduces to the same greedy
//! chordal-graph coloring as the register pass, just without a spill loop since running out
//! of colors is never possible.

use crate::ir::InstId;
use crate::regalloc::interference_graph::InterferenceGraph;
use crate::regalloc::lexbfs::lex_bfs_order;
use std::collections::HashMap;

/// Assign each spilled value in `spilled` the lowest-numbered stack slot not already used by
/// an interfering spilled value, using the same Lex-BFS elimination order as register
/// coloring so two values that would have collided in the same register continue to collide
/// in the same (reused) slot only when their intervals don't actually overlap.
pub fn assign_stack_slots(interference: &InterferenceGraph, spilled: &[InstId]) -> HashMap<InstId, u32> {
    let spill_set: std::collections::HashSet<InstId> = spilled.iter().copied().collect();
    let order = lex_bfs_order(interference);
    let elimination_order: Vec<InstId> = order
        .into_iter()
        .rev()
        .filter(|v| spill_set.contains(v))
        .collect();

    let mut slots: HashMap<InstId, u32> = HashMap::new();
    for &value in &elimination_order {
        let used: std::collections::HashSet<u32> = interference
            .node(value)
            .map(|n| {
                n.interferes_with
                    .iter()
                    .filter_map(|other| slots.get(other).copied())
                    .collect()
            })
            .unwrap_or_default();
        let slot = (0..).find(|s| !used.contains(s)).unwrap();
        slots.insert(value, slot);
    }
    slots
}
