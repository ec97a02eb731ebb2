//! Replacement: turns an accepted [`PairCandidate`] into a real fused pair instruction (plus,
//! for loads, two `LoadPairPart` projections), rewires users, and removes the originals.

use crate::coalescing::pair_collector::PairCandidate;
use crate::ir::{DataType, Graph, InstData, InstId, Opcode};

/// Apply one accepted pair candidate, inserted immediately before `insertion_point`.
pub fn apply(graph: &mut Graph, pair: &PairCandidate, insertion_point: InstId) {
    let base = graph
        .inst(pair.first)
        .base_input()
        .expect("pair candidates are always base-relative array ops");
    let element_ty = graph.inst(pair.first).ty();
    let first_flags = *graph.inst(pair.first).flags();
    let second_flags = *graph.inst(pair.second).flags();

    let opcode = match (pair.is_load, pair.dynamic) {
        (true, true) => Opcode::LoadArrayPair,
        (true, false) => Opcode::LoadArrayPairI,
        (false, true) => Opcode::StoreArrayPair,
        (false, false) => Opcode::StoreArrayPairI,
    };
    let pair_ty = if pair.is_load { element_ty } else { DataType::Void };
    let pair_inst = graph.make_inst(opcode, pair_ty);
    graph.inst_mut(pair_inst).set_data(InstData::PairInfo {
        first: pair.first,
        second: pair.second,
    });
    union_flags(graph, pair_inst, first_flags, second_flags);

    graph.insert_before(insertion_point, pair_inst);
    graph.append_input(pair_inst, base, DataType::Reference);
    if pair.dynamic {
        let index = dynamic_index_value(graph, pair.first);
        graph.append_input(pair_inst, index, DataType::I64);
    }

    if pair.is_load {
        let part0 = make_pair_part(graph, pair_inst, 0, element_ty);
        let part1 = make_pair_part(graph, pair_inst, 1, element_ty);
        graph.insert_after(pair_inst, part1);
        graph.insert_after(pair_inst, part0);
        graph.replace_users(pair.first, part0);
        graph.replace_users(pair.second, part1);
        rebridge_save_states(graph, pair.first, part0);
        rebridge_save_states(graph, pair.second, part1);
    } else {
        let value0 = store_value(graph, pair.first);
        let value1 = store_value(graph, pair.second);
        graph.append_input(pair_inst, value0, element_ty);
        graph.append_input(pair_inst, value1, element_ty);
    }

    for &original in &[pair.first, pair.second] {
        if graph.inst(original).users().is_empty() {
            let _ = graph.remove_dead_inst(original);
        } else {
            graph.unlink_inst(original);
        }
    }
}

fn union_flags(graph: &mut Graph, inst: InstId, a: crate::ir::InstFlags, b: crate::ir::InstFlags) {
    let flags = graph.inst_mut(inst).flags_mut();
    flags.set_can_throw(a.can_throw() || b.can_throw());
    flags.set_can_deoptimize(a.can_deoptimize() || b.can_deoptimize());
    flags.set_barrier(a.barrier() || b.barrier());
    flags.set_requires_state(a.requires_state() || b.requires_state());
    flags.set_is_load(a.is_load());
    flags.set_is_store(a.is_store());
}

fn make_pair_part(graph: &mut Graph, pair_inst: InstId, part: u8, ty: DataType) -> InstId {
    let inst = graph.make_inst(Opcode::LoadPairPart, ty);
    graph.inst_mut(inst).set_data(InstData::PairPart(part));
    graph.append_input(inst, pair_inst, ty);
    inst
}

fn dynamic_index_value(graph: &Graph, load_or_store: InstId) -> InstId {
    let data = graph.inst(load_or_store);
    let slot = if data.opcode().is_load() { 1 } else { 2 };
    data.inputs()[slot].value
}

/// Re-bridge any `SaveState` that still captures `old`'s value (a load consumed by a fused
/// pair) so the deoptimizer reads `new` (its `LoadPairPart` projection) instead.
fn rebridge_save_states(graph: &mut Graph, old: InstId, new: InstId) {
    let save_state_insts: Vec<InstId> = graph
        .block_ids()
        .flat_map(|b| graph.block(b).insts().to_vec())
        .filter(|&i| graph.inst(i).opcode().is_save_state())
        .collect();
    for ss in save_state_insts {
        let Some(payload) = graph.save_state_payload(ss) else {
            continue;
        };
        let indices: Vec<usize> = payload
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.value == old)
            .map(|(idx, _)| idx)
            .collect();
        if indices.is_empty() {
            continue;
        }
        if let Some(payload) = graph.save_state_payload_mut(ss) {
            for idx in indices {
                payload.replace_at(idx, new);
            }
        }
    }
}

fn store_value(graph: &Graph, store: InstId) -> InstId {
    let data = graph.inst(store);
    let slot = if matches!(data.opcode(), Opcode::StoreArrayI) { 1 } else { 2 };
    data.inputs()[slot].value
}
