//! Turns partial escape analysis's raw escape decisions into an ordered materialization
//! plan: which allocations must reappear on the heap, in what order, and with their fields
//! listed in a stable, runtime-declared order ready for scalar replacement to emit as real
//! `NewObject`/`StoreObject` instructions.

use crate::ir::{FieldRef, Graph, InstId};
use crate::pea::analysis::PeaResult;
use crate::pea::state::{Field, StateOwner};
use ark_entity::EntityRef;
use std::collections::{HashMap, HashSet};

/// One field to re-populate when rebuilding a materialized object, in emission order.
#[derive(Clone, Copy, Debug)]
pub struct PlannedField {
    /// The field or array slot being restored.
    pub field: Field,
    /// The value to store, resolved from its `StateOwner` (a `PhiState` owner is resolved to
    /// the real `Phi` scalar replacement creates for it before this plan is built).
    pub owner: StateOwner,
}

/// The materialization plan for one escaping allocation.
#[derive(Clone, Debug)]
pub struct MaterializationPlan {
    /// The original allocation instruction.
    pub allocation: InstId,
    /// Fields to restore, in a stable order (declaration order for object fields, ascending
    /// index for array slots).
    pub fields: Vec<PlannedField>,
}

/// Build one [`MaterializationPlan`] per escaping allocation in `result`, topologically
/// ordered so that if object A's materialization plan stores a reference to object B (also
/// escaping), B's plan appears first.
pub fn build_plans(graph: &Graph, result: &PeaResult) -> Vec<MaterializationPlan> {
    let mut plans: HashMap<InstId, MaterializationPlan> = HashMap::new();
    for state in result.states.iter().skip(1) {
        if !result.non_escaping.contains(&state.allocation) && is_escaping(result, state.allocation) {
            let mut fields: Vec<PlannedField> = state
                .fields()
                .map(|(field, owner)| PlannedField { field, owner })
                .collect();
            sort_fields(graph, state.allocation, &mut fields);
            plans.insert(
                state.allocation,
                MaterializationPlan {
                    allocation: state.allocation,
                    fields,
                },
            );
        }
    }

    topological_order(plans)
}

fn is_escaping(result: &PeaResult, allocation: InstId) -> bool {
    result
        .materialization_sites
        .iter()
        .any(|(_, a)| *a == allocation)
}

fn sort_fields(graph: &Graph, _allocation: InstId, fields: &mut [PlannedField]) {
    fields.sort_by_key(|pf| field_sort_key(graph, pf.field));
}

fn field_sort_key(graph: &Graph, field: Field) -> (u8, u32) {
    match field {
        Field::Object(FieldRef { field, class_id }) => {
            let id = graph.runtime().field_id(field).unwrap_or(0);
            (0, id.wrapping_add(class_id))
        }
        Field::Array(index) => match index {
            crate::pea::state::ArrayIndex::Const(i) => (1, i as u32),
            crate::pea::state::ArrayIndex::Dynamic(v) => (2, v.index() as u32),
        },
    }
}

/// Order plans so a plan whose fields reference another escaping allocation comes after
/// that allocation's own plan.
fn topological_order(plans: HashMap<InstId, MaterializationPlan>) -> Vec<MaterializationPlan> {
    let mut visited: HashSet<InstId> = HashSet::new();
    let mut order = Vec::with_capacity(plans.len());

    fn visit(
        id: InstId,
        plans: &HashMap<InstId, MaterializationPlan>,
        visited: &mut HashSet<InstId>,
        order: &mut Vec<MaterializationPlan>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(plan) = plans.get(&id) else {
            return;
        };
        for field in &plan.fields {
            if let StateOwner::Inst(dep) = field.owner {
                if plans.contains_key(&dep) {
                    visit(dep, plans, visited, order);
                }
            }
        }
        order.push(plan.clone());
    }

    let ids: Vec<InstId> = plans.keys().copied().collect();
    for id in ids {
        visit(id, &plans, &mut visited, &mut order);
    }
    order
}
