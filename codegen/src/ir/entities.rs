//! Dense entity references into the graph's arenas.
//!
//! Instructions reference other entities (blocks, other instructions, virtual heap states)
//! through small `u32`-wrapping indices rather than pointers: it keeps the IR `Copy`,
//! sidesteps the borrow checker fights a graph of raw pointers would invite, and keeps
//! values compact enough that `SmallVec`-backed input/user lists are worth using.

use ark_entity::entity_impl;

/// A dense reference to a [`BasicBlock`](crate::ir::BasicBlock) in a [`Graph`](crate::ir::Graph).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "bb");

/// A dense reference to an [`Inst`](crate::ir::Inst) in a [`Graph`](crate::ir::Graph).
///
/// Because the IR is sea-of-nodes, an `InstId` doubles as the SSA value produced by that
/// instruction: there is no separate `Value` entity.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);
entity_impl!(InstId, "v");

/// A dense id naming a [`VirtualState`](crate::pea::state::VirtualState) tracked by partial
/// escape analysis. `StateId(0)` is reserved as [`MATERIALIZED_ID`]: "this value lives on
/// the heap, its state is not tracked".
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u32);
entity_impl!(StateId, "vs");

/// The reserved [`StateId`] meaning "materialized": the value lives on the heap and PEA no
/// longer tracks its fields.
pub const MATERIALIZED_ID: StateId = StateId(0);

impl StateId {
    /// Is this the reserved [`MATERIALIZED_ID`]?
    pub fn is_materialized(self) -> bool {
        self == MATERIALIZED_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_entity::EntityRef;

    #[test]
    fn materialized_id_is_zero() {
        assert_eq!(StateId::new(0), MATERIALIZED_ID);
        assert!(MATERIALIZED_ID.is_materialized());
        assert!(!StateId::new(1).is_materialized());
    }
}
