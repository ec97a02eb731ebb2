//! The graph checker: verifies the structural invariants passes are expected to preserve.

use crate::error::{CoreError, CoreResult};
use crate::ir::{Graph, Opcode};

/// Verifies a [`Graph`] against the invariants listed in the specification's testable
/// properties: SSA (each value has exactly one definition, already guaranteed by
/// construction since `InstId` doubles as the value), dominance (every use is dominated by
/// its definition), use/def symmetry, SaveState liveness (every live-across-a-call-or-alloc
/// value that isn't itself re-derivable is captured), and `Call.Inlined`/`ReturnInlined`
/// balance.
///
/// Mirrors the shape of the teacher's `verifier::verify_function`: a single entry point that
/// walks the whole graph and accumulates (or early-returns on) violations, run after every
/// pass when `Flags::enable_verifier` is set.
pub struct GraphChecker;

impl GraphChecker {
    /// Run every check against `graph`, returning the first violation found.
    pub fn verify(graph: &mut Graph, pass: &'static str) -> CoreResult<()> {
        Self::check_use_def_symmetry(graph, pass)?;
        Self::check_dominance(graph, pass)?;
        Self::check_save_state_requirements(graph, pass)?;
        Self::check_inline_balance(graph, pass)?;
        Self::check_terminators(graph, pass)?;
        Ok(())
    }

    /// `x` is in `users(y)` iff `y` is in `inputs(x)`.
    fn check_use_def_symmetry(graph: &Graph, pass: &'static str) -> CoreResult<()> {
        for block in graph.block_ids() {
            for &inst in graph.block(block).phis().iter().chain(graph.block(block).insts()) {
                for (slot, input) in graph.inst(inst).inputs().iter().enumerate() {
                    let producer = graph.inst(input.value);
                    let found = producer
                        .users()
                        .iter()
                        .any(|e| e.user == inst && e.slot as usize == slot);
                    if !found {
                        return Err(CoreError::structural(
                            pass,
                            format!(
                                "{} uses {} at slot {} but {} has no matching user edge",
                                inst, input.value, slot, input.value
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every input must be dominated by its producer's block, or be a phi input from the
    /// corresponding predecessor.
    fn check_dominance(graph: &mut Graph, pass: &'static str) -> CoreResult<()> {
        let dom = {
            let _ = graph.dominator_tree();
            // Re-borrow immutably after the lazy computation above.
            graph.dominator_tree()
        };

        for block in graph.block_ids() {
            if !dom.is_reachable(block) && Some(block) != graph.end_block() {
                continue;
            }
            for &phi in graph.block(block).phis() {
                let preds = graph.block(block).preds();
                for (idx, input) in graph.inst(phi).inputs().iter().enumerate() {
                    let Some(&pred) = preds.get(idx) else {
                        continue;
                    };
                    if let Some(def_block) = graph.inst(input.value).block() {
                        if !dom.is_reachable(def_block) {
                            continue;
                        }
                        if !dom.dominates(def_block, pred) && def_block != pred {
                            return Err(CoreError::structural(
                                pass,
                                format!(
                                    "phi {} input {} not dominated by predecessor {}",
                                    phi, input.value, pred
                                ),
                            ));
                        }
                    }
                }
            }
            for &inst in graph.block(block).insts() {
                for input in graph.inst(inst).inputs() {
                    if let Some(def_block) = graph.inst(input.value).block() {
                        if !dom.is_reachable(def_block) {
                            continue;
                        }
                        let ok = def_block == block || dom.dominates(def_block, block);
                        if !ok {
                            return Err(CoreError::structural(
                                pass,
                                format!(
                                    "{} input {} not dominated ({:?} does not dominate {:?})",
                                    inst, input.value, def_block, block
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Every instruction flagged `requires_state` must carry a `save_state` pointer, and that
    /// pointer must itself be one of its input edges.
    fn check_save_state_requirements(graph: &Graph, pass: &'static str) -> CoreResult<()> {
        for block in graph.block_ids() {
            for &inst in graph.block(block).insts() {
                let data = graph.inst(inst);
                if data.flags().requires_state() {
                    let Some(ss) = data.save_state() else {
                        return Err(CoreError::structural(
                            pass,
                            format!("{} requires a SaveState but has none attached", inst),
                        ));
                    };
                    let has_edge = data.inputs().iter().any(|i| i.value == ss);
                    if !has_edge {
                        return Err(CoreError::structural(
                            pass,
                            format!("{}'s SaveState {} is not among its input edges", inst, ss),
                        ));
                    }
                    if !graph.inst(ss).opcode().is_save_state() {
                        return Err(CoreError::structural(
                            pass,
                            format!("{}'s SaveState pointer {} is not a SaveState-family opcode", inst, ss),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every `CallInlined` must be matched by a `ReturnInlined` reachable on every path out of
    /// its frame (approximated here as: at least one `ReturnInlined` exists and references it
    /// through its SaveState's `caller_call`).
    fn check_inline_balance(graph: &Graph, pass: &'static str) -> CoreResult<()> {
        use std::collections::HashSet;
        let mut call_inlined: HashSet<_> = HashSet::new();
        let mut closed: HashSet<_> = HashSet::new();
        for block in graph.block_ids() {
            for &inst in graph.block(block).insts() {
                match graph.inst(inst).opcode() {
                    Opcode::CallInlined => {
                        call_inlined.insert(inst);
                    }
                    Opcode::ReturnInlined => {
                        if let Some(ss) = graph.inst(inst).save_state() {
                            if let Some(payload) = graph.save_state_payload(ss) {
                                if let Some(call) = payload.caller_call {
                                    closed.insert(call);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        for call in &call_inlined {
            if !closed.contains(call) {
                return Err(CoreError::structural(
                    pass,
                    format!("CallInlined {} has no matching ReturnInlined", call),
                ));
            }
        }
        Ok(())
    }

    /// Every non-empty block must end in exactly one terminator, as its last instruction.
    fn check_terminators(graph: &Graph, pass: &'static str) -> CoreResult<()> {
        for block in graph.block_ids() {
            if graph.block(block).flags().empty() {
                continue;
            }
            let insts = graph.block(block).insts();
            let Some(&last) = insts.last() else {
                return Err(CoreError::structural(
                    pass,
                    format!("{:?} has no instructions and is not flagged empty", block),
                ));
            };
            if !graph.inst(last).opcode().is_terminator() {
                return Err(CoreError::structural(
                    pass,
                    format!("{:?}'s last instruction {} is not a terminator", block, last),
                ));
            }
            for &inst in &insts[..insts.len() - 1] {
                if graph.inst(inst).opcode().is_terminator() {
                    return Err(CoreError::structural(
                        pass,
                        format!("{} is a terminator but not the last instruction in {:?}", inst, block),
                    ));
                }
            }
        }
        Ok(())
    }
}
