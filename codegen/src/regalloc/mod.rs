//! Graph-coloring register allocator.
//!
//! Builds life intervals ([`crate::analysis::liveness`]), an interference graph over them
//! (recording, per node, how many calls its interval crosses and its spill weight), groups
//! phi/copy-related nodes into DFS-computed affinity components, finds a perfect elimination
//! ordering with Lex-BFS (intervals form a chordal/interval graph), colors greedily in reverse
//! of that ordering (preferring a node's affinity component's color, then a callee-saved
//! register when the node crosses a call), and runs a spill loop bounded by
//! `Flags::max_spill_rounds`: outside `CompileMode::BytecodeOptimizer`, an uncolorable value
//! with more than one use is split around its use positions and the resulting siblings are
//! recolored; anything left (a single-use or use-less value, or any uncolorable value at all
//! in `BytecodeOptimizer` mode) is evicted, then packed into a stack slot by a second,
//! unconstrained coloring pass -- except in `BytecodeOptimizer` mode, whose single virtual
//! register bank has no stack to overflow into, where eviction is a hard allocation failure.

pub mod coloring;
pub mod interference_graph;
pub mod lexbfs;
pub mod register_set;
pub mod spill;
pub mod stack_slots;

use crate::analysis::liveness::LivenessAnalyzer;
use crate::error::CoreResult;
use crate::ir::{Graph, InstId};
use crate::isa::{RegClass, RegisterMap};
use interference_graph::InterferenceGraph;
use register_set::Location;
use spill::{run_spill_loop, DEFAULT_SPILL_BASE_COST};
use std::collections::HashMap;

/// Run the full register allocator over `graph`, writing each instruction's assigned
/// [`Location`] back into `Inst::location`.
pub fn allocate_registers(graph: &mut Graph) -> CoreResult<()> {
    let _t = crate::timing::regalloc();
    let register_map = RegisterMap::for_architecture(graph.architecture());
    let max_rounds = graph.flags().max_spill_rounds;
    let mode = graph.mode();

    let liveness = LivenessAnalyzer::analyze(graph);
    let value_class: HashMap<InstId, RegClass> = liveness
        .intervals()
        .map(|iv| (iv.value(), RegisterMap::class_for(graph.inst(iv.value()).ty())))
        .collect();

    let call_positions: Vec<_> = liveness
        .order()
        .order()
        .iter()
        .copied()
        .filter(|&inst| graph.inst(inst).opcode().is_call())
        .map(|inst| liveness.order().position_of(inst))
        .collect();

    let mut interference = InterferenceGraph::build_with_callsites(liveness.intervals(), &call_positions);
    add_phi_biases(graph, &mut interference);
    interference.compute_bias_components();

    let mut intervals: HashMap<InstId, _> = liveness.intervals().map(|iv| (iv.value(), iv.clone())).collect();

    let mut locations: HashMap<InstId, Location> = HashMap::new();
    let mut all_spilled: Vec<InstId> = Vec::new();

    for &class in &[RegClass::Int, RegClass::Float] {
        let vc = value_class.clone();
        let outcome = run_spill_loop(
            graph,
            &mut interference,
            &mut intervals,
            class,
            move |v| vc.get(&v).copied() == Some(class),
            &register_map,
            DEFAULT_SPILL_BASE_COST,
            max_rounds,
            mode,
        )?;
        for (value, reg) in outcome.colors {
            locations.insert(value, Location::Register(reg));
        }
        all_spilled.extend(outcome.spilled);
    }

    if !all_spilled.is_empty() {
        let spilled_set: std::collections::HashSet<InstId> = all_spilled.iter().copied().collect();
        let spill_graph = InterferenceGraph::build(intervals.values().filter(|iv| spilled_set.contains(&iv.value())));
        let slots = stack_slots::assign_stack_slots(&spill_graph, &all_spilled);
        for (value, slot) in slots {
            locations.insert(value, Location::StackSlot(slot));
        }
    }

    for (value, location) in locations {
        graph.inst_mut(value).location = Some(location);
    }

    Ok(())
}

/// Add affinity edges between a `Phi` and each of its inputs, and between a `Phi` and the
/// other phi arguments at the same predecessor slot, so the coloring pass prefers eliminating
/// the move a phi would otherwise require.
fn add_phi_biases(graph: &Graph, interference: &mut InterferenceGraph) {
    for block in graph.block_ids() {
        for &phi in graph.block(block).phis() {
            for input in graph.inst(phi).inputs() {
                interference.add_bias(phi, input.value, 10);
            }
        }
    }
}
