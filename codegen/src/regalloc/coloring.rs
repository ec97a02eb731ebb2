//! Greedy coloring over a perfect elimination ordering.

use crate::ir::InstId;
use crate::isa::{PhysicalRegister, RegClass, RegisterMap};
use crate::regalloc::interference_graph::InterferenceGraph;
use crate::regalloc::lexbfs::lex_bfs_order;
use std::collections::HashMap;

/// The outcome of one coloring attempt: either every node got a register, or some set of
/// nodes could not be colored and must be spilled before retrying.
pub enum ColoringResult {
    /// Every node received a physical register.
    Complete(HashMap<InstId, PhysicalRegister>),
    /// These nodes could not be colored with the available registers in their class.
    NeedsSpill(Vec<InstId>),
}

/// Greedily color `graph`'s nodes of class `class` in reverse Lex-BFS order: each node picks
/// the lowest-numbered free register among those not used by already-colored neighbors,
/// preferring its bias component's already-chosen color, then a callee-saved register if its
/// interval crosses any call, over plain first-fit. A chordal graph (which an interval graph
/// always is) is guaranteed colorable with `clique_number` colors in this order; if the
/// register file is smaller than the live clique the pass reports the uncolorable nodes for
/// the spill loop to evict instead of looping forever.
///
/// `graph` is taken `&mut` only because a bias component's first concrete color is recorded
/// back into it as coloring proceeds ( 4.5 step 5); no edges are added or removed.
pub fn color_class(
    graph: &mut InterferenceGraph,
    class: RegClass,
    values_of_class: impl Fn(InstId) -> bool,
    register_map: &RegisterMap,
) -> ColoringResult {
    let order = lex_bfs_order(graph);
    let elimination_order: Vec<InstId> = order
        .into_iter()
        .rev()
        .filter(|&v| values_of_class(v))
        .collect();

    let registers = register_map.registers_in(class);
    let callee_start = register_map.callee_saved_start(class);
    let mut colors: HashMap<InstId, PhysicalRegister> = HashMap::new();
    let mut uncolorable = Vec::new();

    for &value in &elimination_order {
        let node = match graph.node(value) {
            Some(n) => n.clone(),
            None => continue,
        };

        if let Some(fixed) = node.fixed {
            colors.insert(value, fixed);
            continue;
        }

        let used: std::collections::HashSet<PhysicalRegister> = node
            .interferes_with
            .iter()
            .filter_map(|n| colors.get(n).copied())
            .collect();

        let bias_color = node.bias.and_then(|idx| graph.bias_component(idx).color).filter(|r| !used.contains(r));

        let chosen = bias_color.or_else(|| {
            let scan: Box<dyn Iterator<Item = &PhysicalRegister>> = if node.callsite_intersections > 0 {
                Box::new(registers[callee_start.min(registers.len())..].iter().chain(registers[..callee_start.min(registers.len())].iter()))
            } else {
                Box::new(registers.iter())
            };
            scan.copied().find(|r| !used.contains(r))
        });

        match chosen {
            Some(reg) => {
                colors.insert(value, reg);
                if let Some(idx) = node.bias {
                    if graph.bias_component(idx).color.is_none() {
                        graph.set_bias_component_color(idx, reg);
                    }
                }
            }
            None => uncolorable.push(value),
        }
    }

    if uncolorable.is_empty() {
        ColoringResult::Complete(colors)
    } else {
        ColoringResult::NeedsSpill(uncolorable)
    }
}
