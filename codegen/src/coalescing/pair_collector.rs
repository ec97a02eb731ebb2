//! Pair collection: finds adjacent array loads/stores within a block that are legal to fuse
//! into a single pair memory op.

use crate::analysis::alias::{AliasAnalyzer, AliasResult};
use crate::coalescing::variable_analysis::VariableAnalysis;
use crate::ir::{Graph, InstData, InstId, Opcode};

/// Two array memory ops proposed as a fused pair, `first` at the lower index.
#[derive(Clone, Copy, Debug)]
pub struct PairCandidate {
    /// The lower-indexed access, earlier (or equal) in program order.
    pub first: InstId,
    /// The higher-indexed access, `first`'s index plus one.
    pub second: InstId,
    /// Whether this pairs loads (`true`) or stores (`false`).
    pub is_load: bool,
    /// Whether the index is a compile-time constant (`LoadArrayI`/`StoreArrayI`) or dynamic
    /// (`LoadArray`/`StoreArray`, compared via [`VariableAnalysis`]).
    pub dynamic: bool,
}

/// Collect every legal pair candidate in `block`, scanning instructions in reverse program order
/// so a later barrier's invalidation is already known before an earlier candidate pair is
/// proposed.
pub fn collect(
    graph: &Graph,
    block: crate::ir::BlockId,
    variables: &VariableAnalysis,
    allow_references: bool,
) -> Vec<PairCandidate> {
    let alias = AliasAnalyzer::new(graph);
    let insts: Vec<InstId> = graph.block(block).insts().to_vec();
    let mut candidates: Vec<InstId> = Vec::new();
    let mut pairs = Vec::new();

    let osr_entry = graph.block(block).flags().osr_entry();

    for &inst in &insts {
        let opcode = graph.inst(inst).opcode();
        if opcode.is_barrier() {
            candidates.clear();
            continue;
        }
        if opcode.is_save_state() {
            if osr_entry || deoptimizing_save_state(graph, inst) {
                candidates.retain(|&c| !graph.inst(c).opcode().is_store());
            }
            continue;
        }
        if !is_array_access(opcode) {
            if is_invalidating(graph, inst) {
                candidates.clear();
            }
            continue;
        }
        if !element_type_ok(graph, inst, allow_references) {
            candidates.push(inst);
            continue;
        }
        if let Some(pair) = find_partner(graph, &alias, variables, inst, &candidates) {
            pairs.push(pair);
            candidates.retain(|&c| c != pair.first);
        } else {
            candidates.push(inst);
        }
    }
    pairs
}

fn is_array_access(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::LoadArray | Opcode::StoreArray | Opcode::LoadArrayI | Opcode::StoreArrayI
    )
}

/// Does a `SaveState`/`SafePoint` have a user that can throw or deoptimize? Such a save state
/// pins every store candidate seen so far in place -- a deopt replaying from it must observe
/// them in program order -- though loads, having no externally visible effect, stay movable.
fn deoptimizing_save_state(graph: &Graph, save_state: InstId) -> bool {
    graph.inst(save_state).users().iter().any(|u| {
        let opcode = graph.inst(u.user).opcode();
        opcode.can_throw() || opcode.can_deoptimize()
    })
}

/// A non-array-access instruction that still forbids treating the candidates around it as
/// adjacent. `Runtime::is_field_volatile` isn't plumbed through this pass, so a field access
/// can't be proven non-volatile and is treated as if it always were; everything else not known
/// to be a pure value computation is conservatively assumed to alias or have a side effect.
fn is_invalidating(graph: &Graph, inst: InstId) -> bool {
    !matches!(
        graph.inst(inst).opcode(),
        Opcode::Constant
            | Opcode::Parameter
            | Opcode::Add
            | Opcode::Sub
            | Opcode::AddI
            | Opcode::SubI
            | Opcode::Cast
            | Opcode::CompareRef
    )
}

fn element_type_ok(graph: &Graph, inst: InstId, allow_references: bool) -> bool {
    graph.inst(inst).ty().is_coalescable_element(allow_references)
}

fn find_partner(
    graph: &Graph,
    alias: &AliasAnalyzer,
    variables: &VariableAnalysis,
    second: InstId,
    candidates: &[InstId],
) -> Option<PairCandidate> {
    let sd = graph.inst(second);
    let is_load = sd.opcode().is_load();
    for &first in candidates.iter().rev() {
        let fd = graph.inst(first);
        if fd.opcode().is_load() != is_load {
            continue;
        }
        if fd.ty() != sd.ty() {
            continue;
        }
        let (Some(fbase), Some(sbase)) = (fd.base_input(), sd.base_input()) else {
            continue;
        };
        if alias.check_ref_alias(fbase, sbase) != AliasResult::Must {
            continue;
        }
        let dynamic = matches!(sd.opcode(), Opcode::LoadArray | Opcode::StoreArray);
        if dynamic {
            let fi = dynamic_index(fd)?;
            let si = dynamic_index(sd)?;
            if variables.differs_by(si, fi, 1) {
                return Some(PairCandidate { first, second, is_load, dynamic: true });
            }
        } else {
            let (Some(fi), Some(si)) = (const_index(fd), const_index(sd)) else {
                continue;
            };
            if si == fi + 1 && fi % 2 == 0 {
                return Some(PairCandidate { first, second, is_load, dynamic: false });
            }
        }
    }
    None
}

fn const_index(inst: &crate::ir::Inst) -> Option<i64> {
    match inst.data() {
        InstData::ConstIndex(i) => Some(*i),
        _ => None,
    }
}

fn dynamic_index(inst: &crate::ir::Inst) -> Option<InstId> {
    let slot = if inst.opcode().is_load() { 1 } else { 2 };
    inst.inputs().get(slot).map(|i| i.value)
}
