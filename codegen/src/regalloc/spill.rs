//! The bounded spill loop: split or evict low-weight intervals until the remaining graph
//! colors.

use crate::analysis::liveness::LifeInterval;
use crate::error::{CoreError, CoreResult};
use crate::ir::{Graph, InstId, Opcode};
use crate::isa::{PhysicalRegister, RegClass, RegisterMap};
use crate::options::CompileMode;
use crate::regalloc::coloring::{color_class, ColoringResult};
use crate::regalloc::interference_graph::InterferenceGraph;
use std::collections::HashMap;

/// Base for the spill-weight formula's loop-depth exponent ( 4.5): deeper loops make a value
/// exponentially more expensive to spill, since a spilled value inside a loop pays a
/// reload/store cost every iteration rather than once.
pub const DEFAULT_SPILL_BASE_COST: f64 = 4.0;

/// Result of running the spill loop to completion for one register class.
pub struct SpillOutcome {
    /// Final color assignment for every value that stayed in a register.
    pub colors: HashMap<InstId, PhysicalRegister>,
    /// Values evicted to the stack, in eviction order (constants with no uses to split
    /// around, or whole intervals evicted because splitting was unavailable).
    pub spilled: Vec<InstId>,
}

/// Color `class`'s nodes in `interference`, driven by `intervals` (kept in sync as the loop
/// splits uncolorable candidates). Each round:
/// 1. Refresh every node's cached spill weight from `intervals`.
/// 2. Attempt a full coloring.
/// 3. On failure, take the lowest-weight uncolorable candidate:
///    - Outside `CompileMode::BytecodeOptimizer`, if it has use positions, split it around
///      them ( 4.5): mint a fresh shadow identity per sibling via `graph.make_inst` (an
///      instruction never linked into a block, existing purely as a distinct interference-
///      graph node), and add each sibling back to both `intervals` and `interference` for the
///      next round.
///    - Otherwise -- a constant with nothing to split around, or `CompileMode::
///      BytecodeOptimizer`, whose single virtual register bank has no splitting and no
///      overflow path -- evict the whole value; in `BytecodeOptimizer` mode that eviction is
///      reported as a hard failure rather than a stack slot.
///
/// Bounded by `max_rounds`; exceeding it aborts allocation rather than looping forever.
pub fn run_spill_loop(
    graph: &mut Graph,
    interference: &mut InterferenceGraph,
    intervals: &mut HashMap<InstId, LifeInterval>,
    class: RegClass,
    values_of_class: impl Fn(InstId) -> bool + Copy,
    register_map: &RegisterMap,
    base_cost: f64,
    max_rounds: u32,
    mode: CompileMode,
) -> CoreResult<SpillOutcome> {
    let mut spilled = Vec::new();
    let mut round = 0;
    loop {
        let weights: HashMap<InstId, f64> = intervals.values().map(|iv| (iv.value(), iv.spill_weight(base_cost))).collect();
        interference.set_spill_weights(&weights);

        match color_class(interference, class, values_of_class, register_map) {
            ColoringResult::Complete(colors) => {
                return Ok(SpillOutcome { colors, spilled });
            }
            ColoringResult::NeedsSpill(candidates) => {
                if round >= max_rounds {
                    return Err(CoreError::cannot_complete(
                        "regalloc",
                        format!(
                            "spill loop exceeded {} rounds with {} candidates still uncolorable",
                            max_rounds,
                            candidates.len()
                        ),
                    ));
                }
                let victim = *candidates
                    .iter()
                    .min_by(|&&a, &&b| {
                        weights
                            .get(&a)
                            .copied()
                            .unwrap_or(0.0)
                            .partial_cmp(&weights.get(&b).copied().unwrap_or(0.0))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("NeedsSpill candidates is non-empty");

                let victim_interval = intervals
                    .get(&victim)
                    .cloned()
                    .expect("uncolorable candidate must have a tracked interval");

                // A victim with at most one use position can't be narrowed any further
                // (`split_around_uses` would just hand back an identical single-point
                // interval); fall through to eviction instead of looping without progress.
                let can_split = mode != CompileMode::BytecodeOptimizer && victim_interval.uses().len() > 1;

                if can_split {
                    let ty = graph.inst(victim).ty();
                    let original = victim_interval.parent.unwrap_or(victim);
                    interference.remove(victim);
                    intervals.remove(&victim);
                    for sib in victim_interval.split_around_uses() {
                        let shadow = graph.make_inst(Opcode::Generic, ty);
                        let sib = sib.retarget(shadow, original);
                        interference.insert_interval(&sib, intervals.values());
                        intervals.insert(shadow, sib);
                    }
                } else if mode == CompileMode::BytecodeOptimizer {
                    return Err(CoreError::cannot_complete(
                        "regalloc",
                        format!(
                            "{} is uncolorable and bytecode-optimizer mode permits neither splitting nor stack overflow",
                            victim
                        ),
                    ));
                } else {
                    interference.remove(victim);
                    intervals.remove(&victim);
                    spilled.push(victim);
                }
                round += 1;
            }
        }
    }
}

/// Values of `class`'s predicate closure, derived from a type lookup function.
pub fn class_predicate(
    class: RegClass,
    value_class: impl Fn(InstId) -> RegClass,
) -> impl Fn(InstId) -> bool {
    move |v| value_class(v) == class
}
