//! Backward per-block liveness propagation over the linear order, producing one
//! [`LifeInterval`] per value.

use crate::analysis::liveness::life_interval::LifeInterval;
use crate::analysis::liveness::linear_order::LinearOrder;
use crate::ir::{BlockId, Graph, InstId, Opcode};
use std::collections::{HashMap, HashSet};

/// Computes life intervals for every value in a [`Graph`], in the classic "live-in/live-out
/// per block, backward dataflow" style, then projects the result onto the single linear
/// position space the register allocator's interference graph is built over.
pub struct LivenessAnalyzer {
    order: LinearOrder,
    intervals: HashMap<InstId, LifeInterval>,
}

impl LivenessAnalyzer {
    /// Run liveness analysis over `graph`.
    pub fn analyze(graph: &mut Graph) -> Self {
        let order = LinearOrder::build(graph);
        let rpo = graph.rpo().to_vec();

        let mut live_in: HashMap<BlockId, HashSet<InstId>> = HashMap::new();
        let mut live_out: HashMap<BlockId, HashSet<InstId>> = HashMap::new();
        for &b in &rpo {
            live_in.insert(b, HashSet::new());
            live_out.insert(b, HashSet::new());
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().rev() {
                let mut out: HashSet<InstId> = HashSet::new();
                for &succ in graph.block(block).succs() {
                    out.extend(live_in[&succ].iter().copied());
                    // Phi inputs: a use at the predecessor's exit corresponding to this
                    // block's position among `succ`'s predecessors.
                    let pred_index = graph
                        .block(succ)
                        .preds()
                        .iter()
                        .position(|&p| p == block);
                    if let Some(idx) = pred_index {
                        for &phi in graph.block(succ).phis() {
                            if let Some(input) = graph.inst(phi).inputs().get(idx) {
                                out.insert(input.value);
                            }
                        }
                    }
                }

                let mut cur = out.clone();
                // Regular instructions, backward.
                for &inst in graph.block(block).insts().iter().rev() {
                    cur.remove(&inst);
                    for input in graph.inst(inst).inputs() {
                        cur.insert(input.value);
                    }
                }
                // Phis define but their inputs are accounted at the predecessor exit above,
                // not here.
                for &phi in graph.block(block).phis() {
                    cur.remove(&phi);
                }

                if live_out.get(&block) != Some(&out) || live_in.get(&block) != Some(&cur) {
                    changed = true;
                }
                live_out.insert(block, out);
                live_in.insert(block, cur);
            }
        }

        let mut intervals: HashMap<InstId, LifeInterval> = HashMap::new();
        let get_interval = |intervals: &mut HashMap<InstId, LifeInterval>,
                             graph: &Graph,
                             value: InstId,
                             pos: u32| {
            intervals.entry(value).or_insert_with(|| {
                let depth = graph
                    .inst(value)
                    .block()
                    .map(|b| graph.block(b).loop_depth)
                    .unwrap_or(0);
                LifeInterval::new(value, pos, depth)
            });
        };

        for &block in &rpo {
            let start = order.block_start(block);
            let end = order.block_end(block);

            for &value in &live_in[&block] {
                get_interval(&mut intervals, graph, value, start);
                intervals.get_mut(&value).unwrap().add_range(start, end);
            }
            for &value in &live_out[&block] {
                get_interval(&mut intervals, graph, value, start);
                intervals.get_mut(&value).unwrap().add_range(start, end);
            }

            for &phi in graph.block(block).phis() {
                let pos = order.position_of(phi);
                get_interval(&mut intervals, graph, phi, pos);
                intervals.get_mut(&phi).unwrap().add_range(pos, pos + 1);
            }

            for &inst in graph.block(block).insts() {
                let pos = order.position_of(inst);
                get_interval(&mut intervals, graph, inst, pos);
                intervals.get_mut(&inst).unwrap().add_range(pos, pos + 1);

                for input in graph.inst(inst).inputs() {
                    let producer_def = order.position_of(input.value);
                    get_interval(&mut intervals, graph, input.value, producer_def);
                    let register_required = requires_register(inst, graph);
                    intervals
                        .get_mut(&input.value)
                        .unwrap()
                        .add_use(pos, inst, register_required);
                }
            }
        }

        Self { order, intervals }
    }

    /// The computed life interval for `value`, if it is live anywhere.
    pub fn interval(&self, value: InstId) -> Option<&LifeInterval> {
        self.intervals.get(&value)
    }

    /// All computed intervals.
    pub fn intervals(&self) -> impl Iterator<Item = &LifeInterval> {
        self.intervals.values()
    }

    /// The linear order the intervals are expressed in terms of.
    pub fn order(&self) -> &LinearOrder {
        &self.order
    }
}

/// Does the consuming instruction's opcode require its operand to sit in a physical
/// register rather than a stack slot (used by the spill-weight formula to bias which
/// intervals split first)?
fn requires_register(inst: InstId, graph: &Graph) -> bool {
    !matches!(graph.inst(inst).opcode(), Opcode::SaveState | Opcode::SafePoint | Opcode::SaveStateDeoptimize)
}
