//! Variable evolution analysis: recognizes `v = base + diff` chains through `AddI`/`SubI` so
//! pair collection can compare array indices that are equal up to a known constant offset
//! instead of only exact `InstId` identity.

use crate::ir::{Graph, InstData, Opcode};
use std::collections::HashMap;

/// `value = base + diff`, where `diff` may be negative (a `SubI` is folded to a negative
/// `AddI`).
#[derive(Clone, Copy, Debug)]
pub struct DerivedVar {
    /// The value this one is offset from.
    pub base: crate::ir::InstId,
    /// Constant offset from `base`.
    pub diff: i64,
}

/// `base -> {initial, step}` for a reducible loop header phi recognized as a simple counter:
/// a pre-header-constant input and a back-edge input that is `AddI(phi, step)`.
#[derive(Clone, Copy, Debug)]
pub struct LoopVar {
    /// The phi's value on loop entry.
    pub initial: i64,
    /// The constant added to the phi on each back edge.
    pub step: i64,
}

/// The result of running variable evolution analysis over a graph.
#[derive(Default)]
pub struct VariableAnalysis {
    derived: HashMap<crate::ir::InstId, DerivedVar>,
    loop_vars: HashMap<crate::ir::InstId, LoopVar>,
}

impl VariableAnalysis {
    /// The `base + diff` relationship recorded for `value`, if any.
    pub fn derived(&self, value: crate::ir::InstId) -> Option<DerivedVar> {
        self.derived.get(&value).copied()
    }

    /// The `{initial, step}` relationship recorded for a loop header phi, if any.
    pub fn loop_var(&self, value: crate::ir::InstId) -> Option<LoopVar> {
        self.loop_vars.get(&value).copied()
    }

    /// Do `a` and `b` provably differ by exactly `expected` (accounting for a shared derived
    /// base, or both being the very same value with `expected == 0`)?
    pub fn differs_by(&self, a: crate::ir::InstId, b: crate::ir::InstId, expected: i64) -> bool {
        if a == b {
            return expected == 0;
        }
        let da = self.derived(a);
        let db = self.derived(b);
        match (da, db) {
            (Some(da), Some(db)) if da.base == db.base => da.diff - db.diff == expected,
            (Some(da), None) if da.base == b => da.diff == expected,
            (None, Some(db)) if db.base == a => -db.diff == expected,
            _ => false,
        }
    }
}

/// Walk `graph` in RPO recording every `AddI`/`SubI` of an already-analyzed (or fresh) integer
/// value by a constant, and every simple counter loop header phi.
pub fn analyze(graph: &mut Graph) -> VariableAnalysis {
    let mut result = VariableAnalysis::default();
    let rpo = graph.rpo().to_vec();
    for block in rpo {
        for &phi in graph.block(block).phis().to_vec().iter() {
            record_loop_phi(graph, phi, &mut result);
        }
        for &inst in graph.block(block).insts().to_vec().iter() {
            record_derived(graph, inst, &mut result);
        }
    }
    result
}

fn record_derived(graph: &Graph, inst: crate::ir::InstId, result: &mut VariableAnalysis) {
    let data = graph.inst(inst);
    let (Opcode::AddI | Opcode::SubI) = data.opcode() else {
        return;
    };
    let inputs = data.inputs();
    let (Some(lhs), Some(rhs)) = (inputs.first(), inputs.get(1)) else {
        return;
    };
    let Some(constant) = const_int(graph, rhs.value) else {
        return;
    };
    let diff = if data.opcode() == Opcode::SubI { -constant } else { constant };
    let base = match result.derived(lhs.value) {
        Some(d) => {
            result.derived.insert(inst, DerivedVar { base: d.base, diff: d.diff + diff });
            return;
        }
        None => lhs.value,
    };
    result.derived.insert(inst, DerivedVar { base, diff });
}

fn record_loop_phi(graph: &Graph, phi: crate::ir::InstId, result: &mut VariableAnalysis) {
    let inputs = graph.inst(phi).inputs();
    if inputs.len() != 2 {
        return;
    }
    for (entry, back) in [(inputs[0].value, inputs[1].value), (inputs[1].value, inputs[0].value)] {
        let Some(initial) = const_int(graph, entry) else {
            continue;
        };
        let back_data = graph.inst(back);
        if back_data.opcode() != Opcode::AddI {
            continue;
        }
        let back_inputs = back_data.inputs();
        let (Some(a), Some(b)) = (back_inputs.first(), back_inputs.get(1)) else {
            continue;
        };
        if a.value != phi {
            continue;
        }
        if let Some(step) = const_int(graph, b.value) {
            result.loop_vars.insert(phi, LoopVar { initial, step });
            return;
        }
    }
}

fn const_int(graph: &Graph, value: crate::ir::InstId) -> Option<i64> {
    match graph.inst(value).data() {
        InstData::Constant(crate::ir::ConstantValue::Int(i)) => Some(*i),
        _ => None,
    }
}
