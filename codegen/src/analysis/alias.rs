//! Reference and memory-location alias analysis.
//!
//! Used by memory coalescing to check that two array accesses provably touch the same array
//! object before proposing them as a pair, and by scalar replacement's materialization
//! planner to recognize when two `Inst`s are definitely (or definitely not) the same
//! reference.

use crate::ir::{Graph, InstId, Opcode};

/// The result of an alias query between two instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AliasResult {
    /// Provably the same value (identical `InstId`, or provably equal constants/allocations).
    Must,
    /// Cannot be proven either way; treat conservatively as may-alias.
    May,
    /// Provably distinct (e.g. two different `NewObject`s, or a reference vs. a null
    /// constant).
    No,
}

/// Lightweight alias analyzer operating directly on the IR, with no separate points-to graph:
/// at this IR level the only provable facts come from identity, from two accesses sharing
/// the same unique allocation site, or from one side being the null constant.
pub struct AliasAnalyzer<'g> {
    graph: &'g Graph,
}

impl<'g> AliasAnalyzer<'g> {
    /// Borrow `graph` for a single pass's worth of alias queries.
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Compare two reference-typed instructions for aliasing.
    pub fn check_ref_alias(&self, a: InstId, b: InstId) -> AliasResult {
        if a == b {
            return AliasResult::Must;
        }
        let ia = self.graph.inst(a);
        let ib = self.graph.inst(b);
        let a_alloc = ia.opcode().is_allocation();
        let b_alloc = ib.opcode().is_allocation();
        if a_alloc && b_alloc {
            // Two distinct allocation instructions always produce distinct identities.
            return AliasResult::No;
        }
        let a_null = matches!(ia.data(), crate::ir::InstData::Constant(crate::ir::ConstantValue::Null));
        let b_null = matches!(ib.data(), crate::ir::InstData::Constant(crate::ir::ConstantValue::Null));
        if (a_null && b_alloc) || (b_null && a_alloc) {
            return AliasResult::No;
        }
        AliasResult::May
    }

    /// Compare two instructions that both read/write through a base reference input (loads,
    /// stores) for whether they can possibly touch the same memory location: same base
    /// (by `check_ref_alias`) and, for array accesses, indices that cannot be proven
    /// distinct.
    pub fn check_inst_alias(&self, a: InstId, b: InstId) -> AliasResult {
        let ia = self.graph.inst(a);
        let ib = self.graph.inst(b);
        let (Some(base_a), Some(base_b)) = (ia.base_input(), ib.base_input()) else {
            return AliasResult::May;
        };
        match self.check_ref_alias(base_a, base_b) {
            AliasResult::No => return AliasResult::No,
            AliasResult::May => return AliasResult::May,
            AliasResult::Must => {}
        }

        match (ia.opcode(), ib.opcode()) {
            (Opcode::LoadObject | Opcode::StoreObject, Opcode::LoadObject | Opcode::StoreObject) => {
                match (ia.data(), ib.data()) {
                    (crate::ir::InstData::FieldAccess(fa), crate::ir::InstData::FieldAccess(fb)) => {
                        if fa == fb {
                            AliasResult::Must
                        } else {
                            AliasResult::No
                        }
                    }
                    _ => AliasResult::May,
                }
            }
            (
                Opcode::LoadArrayI | Opcode::StoreArrayI,
                Opcode::LoadArrayI | Opcode::StoreArrayI,
            ) => match (ia.data(), ib.data()) {
                (crate::ir::InstData::ConstIndex(ix), crate::ir::InstData::ConstIndex(iy)) => {
                    if ix == iy {
                        AliasResult::Must
                    } else {
                        AliasResult::No
                    }
                }
                _ => AliasResult::May,
            },
            _ => AliasResult::May,
        }
    }
}
