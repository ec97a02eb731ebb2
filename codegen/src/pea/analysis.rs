//! Partial escape analysis: the worklist dataflow that decides which allocations can stay
//! virtual and where the ones that can't must be materialized.

use crate::error::{CoreError, CoreResult};
use crate::ir::{BlockId, CompareCond, DataType, Graph, InstData, InstId, Opcode, StateId, MATERIALIZED_ID};
use crate::pea::state::{ArrayIndex, Field, PhiState, PhiStateId, StateOwner, VirtualState};
use ark_entity::EntityRef;
use std::collections::{HashMap, HashSet};

/// One block's abstract heap state: which SSA values currently denote a tracked (virtual,
/// not yet materialized) allocation, and that allocation's field map.
#[derive(Clone, Default)]
struct BlockState {
    /// `value -> state id` for every value that is currently a virtual reference.
    refs: HashMap<InstId, StateId>,
}

impl PartialEq for BlockState {
    fn eq(&self, other: &Self) -> bool {
        self.refs == other.refs
    }
}

/// The result of running partial escape analysis over a [`Graph`].
pub struct PeaResult {
    /// Virtual states, indexed by `StateId` (index 0 unused: `MATERIALIZED_ID`).
    pub states: Vec<VirtualState>,
    /// Lazy merge placeholders created where predecessors agreed an object stays virtual but
    /// disagreed on a field's value.
    pub phi_states: Vec<PhiState>,
    /// `value -> state id` for every value this pass ever tracked, at the point of its
    /// definition (scalar replacement needs this to know which original values were
    /// virtual-reference-typed).
    pub value_states: HashMap<InstId, StateId>,
    /// Allocations (or the values aliasing them) that escape and must be materialized,
    /// paired with the instruction whose use forced the escape: scalar replacement inserts
    /// the materialization immediately before that instruction.
    pub materialization_sites: Vec<(InstId, InstId)>,
    /// Allocations that never escape: scalar replacement eliminates these entirely.
    pub non_escaping: HashSet<InstId>,
    /// `load instruction -> resolved field owner`, for every `LoadObject`/`LoadArray(I)` whose
    /// base was a tracked virtual reference at that program point. Scalar replacement replaces
    /// the load's users with the resolved value (once `StateOwner::PhiState`/`ZeroInst` owners
    /// are themselves resolved to real instructions) and deletes the load.
    pub resolved_loads: HashMap<InstId, StateOwner>,
    /// `(store instruction, allocation)` for every `StoreObject`/`StoreArray(I)` that folded
    /// into a tracked field rather than forcing an escape. If `allocation` ends up in
    /// `non_escaping`, the store is dead (nothing ever reads the object off the heap) and
    /// scalar replacement deletes it; otherwise the store is left in place as the allocation's
    /// in-place materialization.
    pub folded_stores: Vec<(InstId, InstId)>,
    /// `(CompareRef instruction, result)` for every reference compare where both sides had
    /// known, trackable state ids at that program point. Scalar replacement turns the
    /// instruction itself into the folded `Constant(Bool)`.
    pub folded_compares: Vec<(InstId, bool)>,
}

/// Run partial escape analysis over `graph`.
pub fn analyze(graph: &mut Graph) -> CoreResult<PeaResult> {
    let _t = crate::timing::escape_analysis();
    let budget = graph.flags().max_loop_nesting_depth;
    if graph.loop_tree().max_depth() > budget {
        return Err(CoreError::cannot_complete(
            "escape_analysis",
            format!(
                "loop nesting depth {} exceeds budget {}",
                graph.loop_tree().max_depth(),
                budget
            ),
        ));
    }

    let rpo = graph.rpo().to_vec();
    let mut block_in: HashMap<BlockId, BlockState> = HashMap::new();
    let mut block_out: HashMap<BlockId, BlockState> = HashMap::new();
    for &b in &rpo {
        block_in.insert(b, BlockState::default());
        block_out.insert(b, BlockState::default());
    }

    let mut states: Vec<VirtualState> = vec![VirtualState::new(InstId::new(0), None)]; // index 0 placeholder
    let mut phi_states: Vec<PhiState> = Vec::new();
    let mut value_states: HashMap<InstId, StateId> = HashMap::new();
    let mut materialization_sites: Vec<(InstId, InstId)> = Vec::new();
    let mut escaped: HashSet<InstId> = HashSet::new();
    let mut resolved_loads: HashMap<InstId, StateOwner> = HashMap::new();
    let mut folded_stores: Vec<(InstId, InstId)> = Vec::new();
    let mut folded_compares: Vec<(InstId, bool)> = Vec::new();

    let max_rounds = budget.max(1) + 1;
    let mut round = 0;
    let mut changed = true;
    while changed {
        changed = false;
        round += 1;
        if round > max_rounds {
            return Err(CoreError::cannot_complete(
                "escape_analysis",
                format!("did not converge within {} rounds", max_rounds),
            ));
        }

        for &block in &rpo {
            let preds = graph.block(block).preds().to_vec();
            let merged = if preds.is_empty() {
                BlockState::default()
            } else {
                merge_preds(
                    &preds,
                    &block_out,
                    block,
                    &mut states,
                    &mut phi_states,
                )
            };
            if block_in.get(&block) != Some(&merged) {
                changed = true;
            }
            block_in.insert(block, merged.clone());

            let mut cur = merged;
            for &inst in graph.block(block).insts() {
                transfer(
                    graph,
                    inst,
                    &mut cur,
                    &mut states,
                    &mut value_states,
                    &mut materialization_sites,
                    &mut escaped,
                    &mut resolved_loads,
                    &mut folded_stores,
                    &mut folded_compares,
                );
            }
            if block_out.get(&block) != Some(&cur) {
                changed = true;
            }
            block_out.insert(block, cur);
        }
    }

    let non_escaping: HashSet<InstId> = states
        .iter()
        .skip(1)
        .map(|s| s.allocation)
        .filter(|a| !escaped.contains(a))
        .collect();

    Ok(PeaResult {
        states,
        phi_states,
        value_states,
        materialization_sites,
        non_escaping,
        resolved_loads,
        folded_stores,
        folded_compares,
    })
}

fn merge_preds(
    preds: &[BlockId],
    block_out: &HashMap<BlockId, BlockState>,
    join: BlockId,
    states: &mut Vec<VirtualState>,
    phi_states: &mut Vec<PhiState>,
) -> BlockState {
    let mut merged = BlockState::default();
    if preds.len() == 1 {
        return block_out[&preds[0]].clone();
    }

    let mut candidates: HashMap<InstId, Vec<Option<StateId>>> = HashMap::new();
    for &pred in preds {
        let out = &block_out[&pred];
        for &value in out.refs.keys() {
            candidates.entry(value).or_insert_with(|| vec![None; preds.len()]);
        }
    }
    for (idx, &pred) in preds.iter().enumerate() {
        let out = &block_out[&pred];
        for (value, slots) in candidates.iter_mut() {
            slots[idx] = out.refs.get(value).copied();
        }
    }

    for (value, slots) in candidates {
        if slots.iter().all(|s| s.is_some()) {
            let first = slots[0].unwrap();
            if slots.iter().all(|s| *s == Some(first)) {
                merged.refs.insert(value, first);
                continue;
            }
            // Same value tracked virtual on every path but pointing at structurally
            // different allocations: merge field-by-field into a fresh state, inserting a
            // PhiState placeholder wherever the predecessors disagree.
            let merged_state = merge_virtual_states(&slots, join, states, phi_states);
            merged.refs.insert(value, merged_state);
        }
        // If any predecessor had this value materialized (slots entry None, since a
        // materialized value is not present in `refs`), the value is treated as an ordinary
        // materialized reference at the join: simply omit it from `merged.refs`.
    }

    merged
}

fn merge_virtual_states(
    slots: &[Option<StateId>],
    join: BlockId,
    states: &mut Vec<VirtualState>,
    phi_states: &mut Vec<PhiState>,
) -> StateId {
    let first_id = slots[0].unwrap();
    let allocation = states[first_id.index()].allocation;
    let array_component_type = states[first_id.index()].array_component_type;
    let mut new_state = VirtualState::new(allocation, array_component_type);

    let mut all_fields: HashSet<Field> = HashSet::new();
    for &s in slots.iter().flatten() {
        all_fields.extend(states[s.index()].fields().map(|(f, _)| f));
    }

    for field in all_fields {
        let owners: Vec<Option<StateOwner>> = slots
            .iter()
            .map(|s| s.and_then(|id| states[id.index()].get(field)))
            .collect();
        if owners.iter().all(|o| o.is_some()) {
            let first = owners[0].unwrap();
            if owners.iter().all(|o| *o == Some(first)) {
                new_state.set(field, first);
                continue;
            }
        }
        let ty = type_of_field(field, array_component_type);
        let candidates: Vec<StateOwner> = owners
            .into_iter()
            .map(|o| o.unwrap_or(StateOwner::ZeroInst(ty)))
            .collect();
        let phi_id = PhiStateId(phi_states.len() as u32);
        phi_states.push(PhiState {
            block: join,
            candidates,
            ty,
        });
        new_state.set(field, StateOwner::PhiState(phi_id));
    }

    states.push(new_state);
    StateId::new(states.len() - 1)
}

fn type_of_field(field: Field, array_component_type: Option<DataType>) -> DataType {
    match field {
        Field::Array(_) => array_component_type.unwrap_or(DataType::Any),
        Field::Object(_) => DataType::Any,
    }
}

#[allow(clippy::too_many_arguments)]
fn transfer(
    graph: &Graph,
    inst: InstId,
    cur: &mut BlockState,
    states: &mut Vec<VirtualState>,
    value_states: &mut HashMap<InstId, StateId>,
    materialization_sites: &mut Vec<(InstId, InstId)>,
    escaped: &mut HashSet<InstId>,
    resolved_loads: &mut HashMap<InstId, StateOwner>,
    folded_stores: &mut Vec<(InstId, InstId)>,
    folded_compares: &mut Vec<(InstId, bool)>,
) {
    let data = graph.inst(inst);
    match data.opcode() {
        Opcode::NewObject | Opcode::InitObject => {
            if can_track(graph, inst) {
                let id = StateId::new(states.len());
                states.push(VirtualState::new(inst, None));
                cur.refs.insert(inst, id);
                value_states.insert(inst, id);
            }
        }
        Opcode::NewArray => {
            let component = graph.runtime_array_component(inst);
            if can_track(graph, inst) {
                let id = StateId::new(states.len());
                states.push(VirtualState::new(inst, component));
                cur.refs.insert(inst, id);
                value_states.insert(inst, id);
            }
        }
        Opcode::LoadObject => {
            let base = data.base_input().unwrap();
            if let (Some(&state), InstData::FieldAccess(f)) = (cur.refs.get(&base), data.data()) {
                if let Some(owner) = states[state.index()].get(Field::Object(*f)) {
                    resolved_loads.insert(inst, owner);
                    if let StateOwner::Inst(v) = owner {
                        if let Some(&vs) = cur.refs.get(&v) {
                            cur.refs.insert(inst, vs);
                        }
                    }
                }
            }
        }
        Opcode::StoreObject => {
            let base = data.base_input().unwrap();
            let value = data.inputs().get(1).map(|i| i.value);
            if let (Some(&state), InstData::FieldAccess(f)) = (cur.refs.get(&base), data.data()) {
                if let Some(v) = value {
                    states[state.index()].set(Field::Object(*f), StateOwner::Inst(v));
                    folded_stores.push((inst, states[state.index()].allocation));
                }
            } else if let Some(v) = value {
                if cur.refs.contains_key(&v) {
                    materialize(v, inst, cur, states, materialization_sites, escaped);
                }
            }
        }
        Opcode::LoadArray | Opcode::LoadArrayI => {
            let base = data.base_input().unwrap();
            if let Some(&state) = cur.refs.get(&base) {
                let index = array_index(data);
                if let Some(index) = index {
                    if let Some(owner) = states[state.index()].get(Field::Array(index)) {
                        resolved_loads.insert(inst, owner);
                        if let StateOwner::Inst(v) = owner {
                            if let Some(&vs) = cur.refs.get(&v) {
                                cur.refs.insert(inst, vs);
                            }
                        }
                    }
                }
            }
        }
        Opcode::StoreArray | Opcode::StoreArrayI => {
            let base = data.base_input().unwrap();
            // `StoreArrayI` has no index input (its index lives in `InstData::ConstIndex`),
            // so its value sits one slot earlier than `StoreArray`'s.
            let value_slot = if data.opcode() == Opcode::StoreArrayI { 1 } else { 2 };
            let value = data.inputs().get(value_slot).map(|i| i.value);
            let index = array_index(data);
            if let (Some(&state), Some(index)) = (cur.refs.get(&base), index) {
                if let Some(v) = value {
                    states[state.index()].set(Field::Array(index), StateOwner::Inst(v));
                    folded_stores.push((inst, states[state.index()].allocation));
                }
            } else if let Some(v) = value {
                if cur.refs.contains_key(&v) {
                    materialize(v, inst, cur, states, materialization_sites, escaped);
                }
            }
        }
        Opcode::Phi => {
            // Handled by `merge_preds` when it built this block's `in` state; nothing extra
            // to do at the phi instruction itself.
        }
        Opcode::NullCheck => {
            let checked = data.base_input().unwrap();
            if let Some(&state) = cur.refs.get(&checked) {
                cur.refs.insert(inst, state);
            }
        }
        Opcode::CompareRef => {
            if let (&InstData::Compare(cond), Some(lhs), Some(rhs)) =
                (data.data(), data.inputs().first().map(|i| i.value), data.inputs().get(1).map(|i| i.value))
            {
                let lhs_state = cur.refs.get(&lhs).copied();
                let rhs_state = cur.refs.get(&rhs).copied();
                match (lhs_state, rhs_state, cond) {
                    (Some(a), Some(b), CompareCond::Eq) => folded_compares.push((inst, a == b)),
                    (Some(a), Some(b), CompareCond::Ne) => folded_compares.push((inst, a != b)),
                    _ => {
                        if lhs_state.is_some() {
                            materialize(lhs, inst, cur, states, materialization_sites, escaped);
                        }
                        if rhs_state.is_some() {
                            materialize(rhs, inst, cur, states, materialization_sites, escaped);
                        }
                    }
                }
            }
        }
        Opcode::Deoptimize | Opcode::DeoptimizeIf | Opcode::SaveStateDeoptimize => {
            if let Some(ss) = data.save_state() {
                if let Some(payload) = graph.save_state_payload(ss) {
                    for captured in payload.values().collect::<Vec<_>>() {
                        if cur.refs.contains_key(&captured) {
                            materialize(captured, inst, cur, states, materialization_sites, escaped);
                        }
                    }
                }
            }
        }
        Opcode::Call | Opcode::CallInlined => {
            for input in data.inputs().to_vec() {
                if cur.refs.contains_key(&input.value) {
                    materialize(input.value, inst, cur, states, materialization_sites, escaped);
                }
            }
        }
        Opcode::Generic => {
            for input in data.inputs().to_vec() {
                if input.input_type.is_reference() && cur.refs.contains_key(&input.value) {
                    materialize(input.value, inst, cur, states, materialization_sites, escaped);
                }
            }
        }
        _ => {}
    }
}

fn array_index(inst: &crate::ir::Inst) -> Option<ArrayIndex> {
    match inst.data() {
        InstData::ConstIndex(i) => Some(ArrayIndex::Const(*i)),
        _ => inst
            .inputs()
            .get(1)
            .map(|input| ArrayIndex::Dynamic(input.value)),
    }
}

/// Is this allocation even eligible for tracking (the embedder allows scalar replacement of
/// its class)?
fn can_track(graph: &Graph, alloc: InstId) -> bool {
    match graph.inst(alloc).data() {
        InstData::ClassRef(class) => graph
            .runtime()
            .can_scalar_replace_object(*class)
            .unwrap_or(false),
        _ => false,
    }
}

/// Mark `value` (and, transitively, every virtual reference reachable through its fields) as
/// escaping, recording a materialization site right after `anchor`.
fn materialize(
    value: InstId,
    anchor: InstId,
    cur: &mut BlockState,
    states: &mut Vec<VirtualState>,
    materialization_sites: &mut Vec<(InstId, InstId)>,
    escaped: &mut HashSet<InstId>,
) {
    let mut worklist = vec![value];
    while let Some(v) = worklist.pop() {
        let Some(&state) = cur.refs.get(&v) else {
            continue;
        };
        if state == MATERIALIZED_ID {
            continue;
        }
        let allocation = states[state.index()].allocation;
        if escaped.insert(allocation) {
            materialization_sites.push((anchor, allocation));
            for r in states[state.index()].direct_references().collect::<Vec<_>>() {
                worklist.push(r);
            }
        }
        cur.refs.remove(&v);
    }
}

impl Graph {
    /// The element type of the array class `alloc` (a `NewArray`) creates, via the runtime.
    fn runtime_array_component(&self, alloc: InstId) -> Option<DataType> {
        match self.inst(alloc).data() {
            InstData::ClassRef(class) => self.runtime().array_component_type(*class).ok(),
            _ => None,
        }
    }
}
