//! Abstract heap state tracked by partial escape analysis: one [`VirtualState`] per
//! not-yet-materialized allocation, keyed by [`StateId`].

use crate::ir::{BlockId, DataType, FieldRef, InstId, StateId};
use std::collections::HashMap;

/// A memory location within a virtual object: either a named object field, or an array slot
/// at a constant or dynamic index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    /// An object field, identified by the runtime's field handle.
    Object(FieldRef),
    /// An array element.
    Array(ArrayIndex),
}

/// An array slot's index, kept symbolic so two `StoreArrayI` at the same constant index
/// alias exactly while two at different constants provably don't, and any `StoreArray` at a
/// dynamic index conservatively aliases every slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ArrayIndex {
    /// A compile-time-constant index.
    Const(i64),
    /// A dynamic index computed by the instruction named here.
    Dynamic(InstId),
}

/// The producer of a field's current value inside a [`VirtualState`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateOwner {
    /// An ordinary instruction's result.
    Inst(InstId),
    /// A not-yet-resolved merge placeholder created where predecessors disagree on a field's
    /// value; scalar replacement later turns each of these into a real `Phi`.
    PhiState(PhiStateId),
    /// The type's default/zero value, for a field never explicitly stored to (e.g. a freshly
    /// allocated array's elements before any store).
    ZeroInst(DataType),
}

/// A dense reference to a [`PhiState`] placeholder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PhiStateId(pub u32);

/// A pending merge of a field's value across a virtual object's predecessor states, created
/// when a join point's predecessors keep an object virtual but disagree on one of its
/// fields' current value.
#[derive(Clone, Debug)]
pub struct PhiState {
    /// The block where the real `Phi` this placeholder stands in for will be inserted.
    pub block: BlockId,
    /// One candidate value per predecessor, in the block's predecessor order.
    pub candidates: Vec<StateOwner>,
    /// The field type, needed to give the eventual `Phi` instruction a result type.
    pub ty: DataType,
}

/// Escape-analysis state for one not-yet-materialized allocation.
///
/// `StateId(0)` (`MATERIALIZED_ID`) is never backed by a `VirtualState`: it's the sentinel
/// meaning "this value is an ordinary heap reference, stop tracking it".
#[derive(Clone, Debug)]
pub struct VirtualState {
    /// The allocation site (`NewObject`/`NewArray`/`InitObject`) this state tracks.
    pub allocation: InstId,
    /// Current field values.
    fields: HashMap<Field, StateOwner>,
    /// For an array allocation, its element type and (if known at this program point) a
    /// constant length; `None` length means dynamic and indices are compared symbolically.
    pub array_component_type: Option<DataType>,
    /// Whether this state has been found to escape through a path this pass does not model
    /// precisely (e.g. stored into another heap object) and must be materialized at its
    /// allocation site rather than at a later use.
    pub escapes_at_allocation: bool,
}

impl VirtualState {
    /// A fresh, empty virtual state for an allocation.
    pub fn new(allocation: InstId, array_component_type: Option<DataType>) -> Self {
        Self {
            allocation,
            fields: HashMap::new(),
            array_component_type,
            escapes_at_allocation: false,
        }
    }

    /// Current value of `field`, if ever written (or defaulted).
    pub fn get(&self, field: Field) -> Option<StateOwner> {
        self.fields.get(&field).copied()
    }

    /// Record a store to `field`.
    pub fn set(&mut self, field: Field, owner: StateOwner) {
        self.fields.insert(field, owner);
    }

    /// All tracked fields and their current owners.
    pub fn fields(&self) -> impl Iterator<Item = (Field, StateOwner)> + '_ {
        self.fields.iter().map(|(&f, &o)| (f, o))
    }

    /// Every `Inst`-owned value reachable from this state's fields (used to build the
    /// transitive closure when materializing).
    pub fn direct_references(&self) -> impl Iterator<Item = InstId> + '_ {
        self.fields.values().filter_map(|o| match o {
            StateOwner::Inst(i) => Some(*i),
            _ => None,
        })
    }
}
