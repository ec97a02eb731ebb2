//! Decompose/compose: turns every conditional deopt guard (`NullCheck`, `DeoptimizeIf`) into
//! an explicit branch to a dedicated deopt block before the main escape analysis runs, giving
//! materialization a concrete, escape-only program point to land on instead of sharing the
//! guard's fallthrough. Once scalar replacement is done, a guard whose deopt block never
//! received a materialization is recomposed back into its original folded form, since the
//! extra block and branch bought nothing.

use crate::ir::{BlockId, CompareCond, ConstantValue, DataType, Graph, InstData, InstId, Opcode};

/// Which guard opcode a [`DecomposedGuard`] replaced; recomposing a `DeoptimizeIf` has to
/// rebuild the instruction (it carries no result value downstream code depends on), while a
/// `NullCheck` is left in place throughout since its result is the checked reference itself.
#[derive(Clone, Copy, PartialEq, Eq)]
enum GuardKind {
    NullCheck,
    DeoptimizeIf,
}

/// One guard split by [`decompose`], with everything [`compose`] needs to either leave the
/// split in place or undo it.
pub struct DecomposedGuard {
    kind: GuardKind,
    /// The original block the guard (and now the branch) lives in.
    host_block: BlockId,
    /// The boolean feeding the new `If`; `true` means "take the deopt block".
    condition: InstId,
    /// The guard's original `SaveState` input, carried over to the explicit `Deoptimize`.
    save_state: Option<InstId>,
    /// The freshly created deopt block, holding only the explicit `Deoptimize`.
    deopt_block: BlockId,
    deopt_inst: InstId,
    /// The block the guard's original fallthrough continues in.
    continue_block: BlockId,
    branch: InstId,
}

/// Split every `NullCheck`/`DeoptimizeIf` in `graph` into an explicit branch plus a dedicated
/// deopt block, per the escape analysis's decompose step. Call [`compose`] with the returned
/// list once scalar replacement has run.
pub fn decompose(graph: &mut Graph) -> Vec<DecomposedGuard> {
    let guards: Vec<InstId> = graph
        .block_ids()
        .flat_map(|b| graph.block(b).insts().to_vec())
        .filter(|&i| matches!(graph.inst(i).opcode(), Opcode::NullCheck | Opcode::DeoptimizeIf))
        .collect();

    let decomposed: Vec<DecomposedGuard> = guards.into_iter().map(|guard| split_guard(graph, guard)).collect();
    graph.invalidate_analyses();
    decomposed
}

fn split_guard(graph: &mut Graph, guard: InstId) -> DecomposedGuard {
    let host_block = graph.inst(guard).block().expect("guard must be linked into a block");
    let save_state = graph.inst(guard).save_state();

    let (kind, condition) = match graph.inst(guard).opcode() {
        Opcode::DeoptimizeIf => (GuardKind::DeoptimizeIf, graph.inst(guard).inputs()[0].value),
        Opcode::NullCheck => (GuardKind::NullCheck, synthesize_null_compare(graph, guard)),
        other => unreachable!("split_guard called on non-guard opcode {:?}", other),
    };

    let continue_block = graph.split_block_after(host_block, guard);

    if kind == GuardKind::DeoptimizeIf {
        let _ = graph.remove_dead_inst(guard);
    }

    let deopt_block = graph.create_block();
    let deopt_inst = graph.make_inst(Opcode::Deoptimize, DataType::Void);
    graph.append_inst(deopt_block, deopt_inst);
    if let Some(ss) = save_state {
        graph.set_save_state(deopt_inst, ss);
    }

    // `split_block_after` wired `host_block -> continue_block` as a plain fallthrough; replace
    // it with the explicit two-way branch on the guard's deopt condition.
    graph.remove_edge(host_block, continue_block);
    let branch = graph.make_inst(Opcode::If, DataType::Void);
    graph.append_input(branch, condition, DataType::Bool);
    graph.append_inst(host_block, branch);
    graph.add_edge(host_block, deopt_block);
    graph.add_edge(host_block, continue_block);

    DecomposedGuard {
        kind,
        host_block,
        condition,
        save_state,
        deopt_block,
        deopt_inst,
        continue_block,
        branch,
    }
}

/// `NullCheck` carries no boolean result of its own; synthesize an explicit
/// `CompareRef(checked, null, Eq)` immediately before it to feed the new `If`.
fn synthesize_null_compare(graph: &mut Graph, guard: InstId) -> InstId {
    let checked = graph.inst(guard).base_input().expect("NullCheck has a checked reference input");
    let null_const = graph.make_inst(Opcode::Constant, DataType::Reference);
    graph.inst_mut(null_const).set_data(InstData::Constant(ConstantValue::Null));
    graph.insert_before(guard, null_const);

    let cmp = graph.make_inst(Opcode::CompareRef, DataType::Bool);
    graph.inst_mut(cmp).set_data(InstData::Compare(CompareCond::Eq));
    graph.append_input(cmp, checked, DataType::Reference);
    graph.append_input(cmp, null_const, DataType::Reference);
    graph.insert_before(guard, cmp);
    cmp
}

/// Restore every decomposed guard whose deopt block never received a materialization back to
/// its original folded form (branch + explicit `Deoptimize` collapsed back into the single
/// conditional-deopt instruction).
pub fn compose(graph: &mut Graph, decomposed: &[DecomposedGuard]) {
    for guard in decomposed {
        if graph.block(guard.deopt_block).insts().len() > 1 {
            // Something materialized on the deopt-only path; the split earns its keep.
            continue;
        }
        recombine(graph, guard);
    }
    graph.invalidate_analyses();
}

fn recombine(graph: &mut Graph, guard: &DecomposedGuard) {
    let _ = graph.remove_dead_inst(guard.deopt_inst);
    graph.remove_edge(guard.host_block, guard.deopt_block);
    let _ = graph.remove_dead_inst(guard.branch);

    match guard.kind {
        GuardKind::NullCheck => {
            // The `NullCheck` itself was left in place in `host_block` throughout; only the
            // synthesized null compare that fed the removed branch needs cleanup.
            if graph.inst(guard.condition).users().is_empty() {
                let null_const = graph.inst(guard.condition).inputs().get(1).map(|i| i.value);
                let _ = graph.remove_dead_inst(guard.condition);
                if let Some(null_const) = null_const {
                    if graph.inst(null_const).users().is_empty() {
                        let _ = graph.remove_dead_inst(null_const);
                    }
                }
            }
        }
        GuardKind::DeoptimizeIf => {
            let rebuilt = graph.make_inst(Opcode::DeoptimizeIf, DataType::Void);
            graph.append_input(rebuilt, guard.condition, DataType::Bool);
            graph.append_inst(guard.host_block, rebuilt);
            if let Some(ss) = guard.save_state {
                graph.set_save_state(rebuilt, ss);
            }
        }
    }

    graph.merge_block_into(guard.host_block, guard.continue_block);
}
