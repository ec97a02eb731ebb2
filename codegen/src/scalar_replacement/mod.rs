//! Scalar replacement: turns partial escape analysis's decisions into actual graph edits.
//!
//! For every allocation PEA proved never escapes, every load/store that ever touched it is
//! redundant: loads are replaced by the value PEA already tracked, stores are dropped, and
//! once nothing reads the allocation off the heap the `NewObject`/`NewArray`/`InitObject`
//! itself is deleted. For an allocation that escapes, this pass rematerializes it right
//! before the instruction whose use forced the escape: a cloned allocation, an ordered
//! `StoreObject`/`StoreArray(I)` per field the analysis tracked, and a `replace_users` that
//! repoints every use of the original (including any `SaveState` entry that still captures
//! it) at the clone, after which the original allocation and the stores that built up its
//! virtual state are dead weight and get removed. `PhiState` placeholders become real `Phi`
//! instructions wherever PEA recorded one. `CompareRef`s the analysis proved constant fold
//! into a `Constant(Bool)` in place. Before any of this runs, every conditional deopt guard
//! has already been split into an explicit branch plus a dedicated deopt block (see
//! `pea::decompose`) so a materialization forced purely by the deopt path has somewhere to
//! land without entangling the guard's normal fallthrough; guards whose deopt block ends up
//! unused are recomposed back afterwards.

use crate::error::CoreResult;
use crate::ir::{ConstantValue, DataType, Graph, Input, InstData, InstId, Opcode};
use crate::pea::state::{ArrayIndex, Field, StateOwner};
use crate::pea::{self, MaterializationPlan, PeaResult, PhiStateId};
use std::collections::{HashMap, HashSet};

/// Summary of what one run of scalar replacement changed, for pass diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScalarReplacementStats {
    /// Allocations deleted entirely because they never escaped.
    pub eliminated_allocations: usize,
    /// Allocations that escaped and were rematerialized as a clone plus field stores at
    /// their escape site.
    pub materialized_allocations: usize,
    /// Loads replaced by a directly-tracked value.
    pub eliminated_loads: usize,
    /// Stores dropped because their target never escaped or was superseded by a
    /// rematerialized clone.
    pub eliminated_stores: usize,
    /// Real `Phi` instructions created for `PhiState` placeholders.
    pub phis_created: usize,
    /// `CompareRef`s folded to a constant because both sides had known state ids.
    pub compares_folded: usize,
}

/// Run partial escape analysis and then rewrite `graph` according to its findings.
pub fn run(graph: &mut Graph) -> CoreResult<ScalarReplacementStats> {
    let _t = crate::timing::scalar_replacement();
    let decomposed = pea::decompose(graph);
    let result = pea::analyze(graph)?;
    let plans = pea::build_plans(graph, &result);
    validate_plans(&plans, &result);

    let mut stats = ScalarReplacementStats::default();

    let phi_map = create_phis(graph, &result, &mut stats);
    let mut zero_cache: HashMap<DataType, InstId> = HashMap::new();
    let mut clones: HashMap<InstId, InstId> = HashMap::new();
    wire_phis(graph, &result, &phi_map, &mut zero_cache, &clones);

    materialize_escaping_allocations(graph, &result, &plans, &phi_map, &mut zero_cache, &mut clones, &mut stats);

    replace_loads(graph, &result, &phi_map, &mut zero_cache, &clones, &mut stats)?;
    fold_compares(graph, &result, &mut stats);
    drop_dead_stores(graph, &result, &clones, &mut stats)?;
    patch_save_states(graph, &result, &clones);
    delete_dead_allocations(graph, &result, &clones, &mut stats)?;

    pea::compose(graph, &decomposed);

    graph.invalidate_analyses();
    Ok(stats)
}

/// Fold every `CompareRef` the analysis proved constant ( 4.2: "if both sides have known
/// state ids the comparison is folded to a constant") into a `Constant(Bool)`, in place.
fn fold_compares(graph: &mut Graph, result: &PeaResult, stats: &mut ScalarReplacementStats) {
    for &(inst, value) in &result.folded_compares {
        graph.fold_to_constant(inst, InstData::Constant(ConstantValue::Bool(value)));
        stats.compares_folded += 1;
    }
}

/// `StateOwner::Inst(v)` where `v` is itself a load this pass is about to retarget should
/// resolve to whatever that load resolves to, not to the (about-to-be-dead) load itself.
fn canonical_owner(owner: StateOwner, resolved_loads: &HashMap<InstId, StateOwner>) -> StateOwner {
    let mut cur = owner;
    let mut seen = HashSet::new();
    loop {
        match cur {
            StateOwner::Inst(v) if seen.insert(v) => match resolved_loads.get(&v) {
                Some(&next) => cur = next,
                None => return cur,
            },
            _ => return cur,
        }
    }
}

/// Resolve a field/phi-candidate owner to the concrete instruction that now holds its value.
/// `clones` redirects an owner that names an allocation this pass has since rematerialized
/// (escaping allocations are topologically ordered, so a dependency's clone always exists by
/// the time a dependent plan needs it).
fn resolve_to_inst(
    graph: &mut Graph,
    owner: StateOwner,
    resolved_loads: &HashMap<InstId, StateOwner>,
    phi_map: &HashMap<PhiStateId, InstId>,
    zero_cache: &mut HashMap<DataType, InstId>,
    clones: &HashMap<InstId, InstId>,
) -> InstId {
    match canonical_owner(owner, resolved_loads) {
        StateOwner::Inst(v) => clones.get(&v).copied().unwrap_or(v),
        StateOwner::PhiState(id) => *phi_map
            .get(&id)
            .expect("every PhiState gets a real Phi before any owner is resolved"),
        StateOwner::ZeroInst(ty) => *zero_cache
            .entry(ty)
            .or_insert_with(|| make_zero_constant(graph, ty)),
    }
}

/// Materialize the zero/default value for `ty` as a `Constant`, inserted at the top of the
/// entry block so it dominates every use a field default could possibly reach.
fn make_zero_constant(graph: &mut Graph, ty: DataType) -> InstId {
    let value = match ty {
        DataType::Bool => ConstantValue::Bool(false),
        _ if ty.is_float() => ConstantValue::Float(0.0),
        DataType::Reference | DataType::Pointer | DataType::Any => ConstantValue::Null,
        _ => ConstantValue::Int(0),
    };
    let inst = graph.make_inst(Opcode::Constant, ty);
    graph.inst_mut(inst).set_data(InstData::Constant(value));
    let entry = graph.start_block();
    match graph.block(entry).insts().first().copied() {
        Some(first) => graph.insert_before(first, inst),
        None => graph.append_inst(entry, inst),
    }
    inst
}

/// Create one real `Phi` per `PhiState` placeholder, unwired. Done as its own pass before any
/// wiring so mutually-referencing placeholders (a phi whose candidate is itself another
/// not-yet-built phi) always find their target already allocated.
fn create_phis(
    graph: &mut Graph,
    result: &PeaResult,
    stats: &mut ScalarReplacementStats,
) -> HashMap<PhiStateId, InstId> {
    let mut phi_map = HashMap::with_capacity(result.phi_states.len());
    for (idx, phi_state) in result.phi_states.iter().enumerate() {
        let id = PhiStateId(idx as u32);
        let inst = graph.make_inst(Opcode::Phi, phi_state.ty);
        graph.append_inst(phi_state.block, inst);
        phi_map.insert(id, inst);
        stats.phis_created += 1;
    }
    phi_map
}

fn wire_phis(
    graph: &mut Graph,
    result: &PeaResult,
    phi_map: &HashMap<PhiStateId, InstId>,
    zero_cache: &mut HashMap<DataType, InstId>,
    clones: &HashMap<InstId, InstId>,
) {
    for (idx, phi_state) in result.phi_states.iter().enumerate() {
        let id = PhiStateId(idx as u32);
        let phi_inst = phi_map[&id];
        for &candidate in &phi_state.candidates {
            let value = resolve_to_inst(graph, candidate, &result.resolved_loads, phi_map, zero_cache, clones);
            graph.append_input(phi_inst, value, phi_state.ty);
        }
    }
}

/// Rematerialize every escaping allocation: for each [`MaterializationPlan`], in the
/// topological order `build_plans` already produced, clone the allocation immediately before
/// its (single) escape site and emit an ordered field store per planned field, then redirect
/// every remaining use of the original allocation to the clone. Processing plans in
/// dependency order means that if one escaping object's field points at another escaping
/// object, the referenced object's clone already exists when it's needed as a store value.
fn materialize_escaping_allocations(
    graph: &mut Graph,
    result: &PeaResult,
    plans: &[MaterializationPlan],
    phi_map: &HashMap<PhiStateId, InstId>,
    zero_cache: &mut HashMap<DataType, InstId>,
    clones: &mut HashMap<InstId, InstId>,
    stats: &mut ScalarReplacementStats,
) {
    let anchors: HashMap<InstId, InstId> = result
        .materialization_sites
        .iter()
        .map(|&(anchor, allocation)| (allocation, anchor))
        .collect();

    for plan in plans {
        let Some(&anchor) = anchors.get(&plan.allocation) else {
            // The planner is conservative: a plan with no recorded escape site isn't one of
            // this run's actual escapes (see `validate_plans`).
            continue;
        };
        let clone = clone_allocation(graph, plan.allocation, anchor);
        for field in &plan.fields {
            let value = resolve_to_inst(graph, field.owner, &result.resolved_loads, phi_map, zero_cache, clones);
            emit_field_store(graph, clone, field.field, value, anchor);
        }
        graph.replace_users(plan.allocation, clone);
        clones.insert(plan.allocation, clone);
        stats.materialized_allocations += 1;
    }
}

/// Clone `original`'s allocation (opcode, type, constructor inputs, and `SaveState`)
/// immediately before `anchor`, the instruction whose use forced the escape.
fn clone_allocation(graph: &mut Graph, original: InstId, anchor: InstId) -> InstId {
    let opcode = graph.inst(original).opcode();
    let ty = graph.inst(original).ty();
    let data = graph.inst(original).data().clone();
    let original_save_state = graph.inst(original).save_state();
    let constructor_inputs: Vec<Input> = graph
        .inst(original)
        .inputs()
        .iter()
        .copied()
        .filter(|input| Some(input.value) != original_save_state)
        .collect();

    let clone = graph.make_inst(opcode, ty);
    graph.inst_mut(clone).set_data(data);
    graph.insert_before(anchor, clone);
    for input in constructor_inputs {
        graph.append_input(clone, input.value, input.input_type);
    }
    // Prefer the anchor's own SaveState (it dominates the clone by construction); fall back
    // to the allocation's original one, which -- being the state at the allocation site --
    // dominates every later use including `anchor`.
    if let Some(save_state) = graph.inst(anchor).save_state().or(original_save_state) {
        graph.set_save_state(clone, save_state);
    }
    clone
}

/// Emit one `StoreObject`/`StoreArray(I)` writing `value` into `clone`'s `field`, inserted
/// immediately before `anchor`.
fn emit_field_store(graph: &mut Graph, clone: InstId, field: Field, value: InstId, anchor: InstId) -> InstId {
    let value_ty = graph.inst(value).ty();
    match field {
        Field::Object(field_ref) => {
            let store = graph.make_inst(Opcode::StoreObject, DataType::Void);
            graph.inst_mut(store).set_data(InstData::FieldAccess(field_ref));
            graph.insert_before(anchor, store);
            graph.append_input(store, clone, DataType::Reference);
            graph.append_input(store, value, value_ty);
            store
        }
        Field::Array(ArrayIndex::Const(index)) => {
            let store = graph.make_inst(Opcode::StoreArrayI, DataType::Void);
            graph.inst_mut(store).set_data(InstData::ConstIndex(index));
            graph.insert_before(anchor, store);
            graph.append_input(store, clone, DataType::Reference);
            graph.append_input(store, value, value_ty);
            store
        }
        Field::Array(ArrayIndex::Dynamic(index_value)) => {
            let store = graph.make_inst(Opcode::StoreArray, DataType::Void);
            graph.insert_before(anchor, store);
            graph.append_input(store, clone, DataType::Reference);
            graph.append_input(store, index_value, DataType::I64);
            graph.append_input(store, value, value_ty);
            store
        }
    }
}

fn replace_loads(
    graph: &mut Graph,
    result: &PeaResult,
    phi_map: &HashMap<PhiStateId, InstId>,
    zero_cache: &mut HashMap<DataType, InstId>,
    clones: &HashMap<InstId, InstId>,
    stats: &mut ScalarReplacementStats,
) -> CoreResult<()> {
    let loads: Vec<(InstId, StateOwner)> = result
        .resolved_loads
        .iter()
        .map(|(&load, &owner)| (load, owner))
        .collect();
    for (load, owner) in &loads {
        let value = resolve_to_inst(graph, *owner, &result.resolved_loads, phi_map, zero_cache, clones);
        if *load != value {
            graph.replace_users(*load, value);
        }
    }
    for (load, _) in loads {
        if graph.inst(load).users().is_empty() {
            graph.remove_dead_inst(load)?;
            stats.eliminated_loads += 1;
        }
    }
    Ok(())
}

/// Drop every folded store whose allocation either never escaped (nothing will ever read it
/// off the heap) or did escape and has since been rematerialized as a clone with its own
/// field stores (the original store is superseded, not merely redundant).
fn drop_dead_stores(
    graph: &mut Graph,
    result: &PeaResult,
    clones: &HashMap<InstId, InstId>,
    stats: &mut ScalarReplacementStats,
) -> CoreResult<()> {
    let dead: HashSet<InstId> = result
        .folded_stores
        .iter()
        .filter(|(_, alloc)| result.non_escaping.contains(alloc) || clones.contains_key(alloc))
        .map(|(store, _)| *store)
        .collect();
    for store in dead {
        graph.remove_dead_inst(store)?;
        stats.eliminated_stores += 1;
    }
    Ok(())
}

/// Patch every `SaveState`-family entry affected by this pass's rewrite ( 4.3 step 6): an
/// entry capturing an allocation that never escapes is dropped outright (nothing will ever
/// reconstruct it from the heap, so the deoptimizer has nothing to restore it from either,
/// and is marked `virtualized` so the deoptimizer knows to rebuild it from its resolved
/// fields); an entry capturing an allocation that escaped is bridged to point at the clone
/// rematerialized at the escape site, since the original allocation it named is about to be
/// deleted.
fn patch_save_states(graph: &mut Graph, result: &PeaResult, clones: &HashMap<InstId, InstId>) {
    let candidates: Vec<InstId> = graph
        .block_ids()
        .flat_map(|b| graph.block(b).insts().to_vec())
        .filter(|&i| graph.inst(i).opcode().is_save_state())
        .collect();
    for inst in candidates {
        let Some(payload) = graph.save_state_payload(inst) else {
            continue;
        };
        let dead_indices: Vec<usize> = payload
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| result.non_escaping.contains(&e.value))
            .map(|(idx, _)| idx)
            .collect();
        let bridge_indices: Vec<(usize, InstId)> = payload
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| clones.get(&e.value).map(|&clone| (idx, clone)))
            .collect();
        if dead_indices.is_empty() && bridge_indices.is_empty() {
            continue;
        }
        let Some(payload) = graph.save_state_payload_mut(inst) else {
            continue;
        };
        for (idx, clone) in bridge_indices {
            payload.replace_at(idx, clone);
        }
        for idx in dead_indices.iter().rev() {
            let value = payload.entries()[*idx].value;
            payload.mark_virtualized(value);
            payload.remove_at(*idx);
        }
    }
}

fn delete_dead_allocations(
    graph: &mut Graph,
    result: &PeaResult,
    clones: &HashMap<InstId, InstId>,
    stats: &mut ScalarReplacementStats,
) -> CoreResult<()> {
    for &alloc in &result.non_escaping {
        if graph.inst(alloc).users().is_empty() {
            graph.remove_dead_inst(alloc)?;
            stats.eliminated_allocations += 1;
        } else {
            log::debug!(
                "scalar_replacement: {} proven non-escaping but still has direct uses \
                 left after alias rewriting and compare folding; leaving the allocation in \
                 place",
                alloc
            );
        }
    }
    for &alloc in clones.keys() {
        if graph.inst(alloc).users().is_empty() {
            graph.remove_dead_inst(alloc)?;
        } else {
            log::debug!(
                "scalar_replacement: {} rematerialized as a clone but the original still has \
                 direct uses outside the analyzed paths; leaving it in place",
                alloc
            );
        }
    }
    Ok(())
}

/// Sanity-check that every field a materialization plan would need to restore is resolvable
/// to a concrete owner, logging rather than failing: a gap here means escape analysis and the
/// planner disagree, worth a trace line for whoever next touches either pass.
fn validate_plans(plans: &[MaterializationPlan], result: &PeaResult) {
    for plan in plans {
        for field in &plan.fields {
            if let StateOwner::PhiState(id) = field.owner {
                if result.phi_states.get(id.0 as usize).is_none() {
                    log::warn!(
                        "scalar_replacement: materialization plan for {} references \
                         out-of-range phi state {:?}",
                        plan.allocation,
                        id
                    );
                }
            }
        }
    }
}
