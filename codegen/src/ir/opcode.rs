//! The fixed opcode set consumed by the optimizations in this crate.
//!
//! The frontend may originate a much larger bytecode-ISA opcode set (out of scope per the
//! specification); this enum only lists the opcodes the escape analysis, scalar
//! replacement, memory coalescing, and register allocator passes actually pattern-match on.
//! Everything else the frontend emits is represented as [`Opcode::Generic`] and treated
//! conservatively (no dedicated transfer function, just "materialize all reference
//! inputs").

use std::fmt;

/// Condition code for [`Opcode::CompareRef`] and friends.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CompareCond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareCond {
    /// The condition obtained by swapping the operands.
    pub fn swapped(self) -> Self {
        match self {
            CompareCond::Eq => CompareCond::Eq,
            CompareCond::Ne => CompareCond::Ne,
            CompareCond::Lt => CompareCond::Gt,
            CompareCond::Le => CompareCond::Ge,
            CompareCond::Gt => CompareCond::Lt,
            CompareCond::Ge => CompareCond::Le,
        }
    }
}

/// The opcode of an [`Inst`](crate::ir::Inst).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    // --- constants & parameters ---
    /// An integer, float, boolean, or null constant. Payload: [`InstData::Constant`].
    Constant,
    /// A function parameter. Payload: [`InstData::Param`].
    Parameter,
    /// Resolves and initializes a class; frontend-originated, escape analysis treats it as
    /// an ordinary non-reference-producing instruction that must precede any `NewObject` of
    /// that class.
    LoadAndInitClass,

    // --- allocation ---
    /// Allocates a new object of a given class. Payload: [`InstData::ClassRef`].
    NewObject,
    /// Allocates a new array of a given component type and length input.
    /// Payload: [`InstData::ClassRef`].
    NewArray,
    /// Explicit field-by-field object initializer, accepted only when
    /// `compiler_support_init_object_inst` is set. Payload: [`InstData::ClassRef`].
    InitObject,

    // --- field/array access ---
    /// Loads a field from an object input. Payload: [`InstData::FieldAccess`].
    LoadObject,
    /// Stores a value into a field of an object input. Payload: [`InstData::FieldAccess`].
    StoreObject,
    /// Loads an array element at a non-constant index input.
    LoadArray,
    /// Stores a value to an array element at a non-constant index input.
    StoreArray,
    /// Loads an array element at a constant index. Payload: [`InstData::ConstIndex`].
    LoadArrayI,
    /// Stores a value to an array element at a constant index.
    /// Payload: [`InstData::ConstIndex`].
    StoreArrayI,

    // --- coalesced pair forms, produced by memory coalescing, never by the frontend ---
    /// Paired array load at a dynamic base index. Payload: [`InstData::PairInfo`].
    LoadArrayPair,
    /// Paired array load at a constant index. Payload: [`InstData::PairInfo`].
    LoadArrayPairI,
    /// Paired array store at a dynamic base index. Payload: [`InstData::PairInfo`].
    StoreArrayPair,
    /// Paired array store at a constant index. Payload: [`InstData::PairInfo`].
    StoreArrayPairI,
    /// Projects element 0 or 1 out of a `LoadArrayPair`/`LoadArrayPairI`.
    /// Payload: [`InstData::PairPart`].
    LoadPairPart,

    // --- arithmetic, used by variable evolution analysis and the example scenarios ---
    /// Generic addition.
    Add,
    /// Generic subtraction.
    Sub,
    /// Integer addition, used by variable evolution analysis to recognize `base + diff`.
    AddI,
    /// Integer subtraction, used by variable evolution analysis to recognize `base - diff`.
    SubI,

    // --- checks / casts / compares ---
    /// Null check on a reference input; traps (and can deoptimize) if null.
    NullCheck,
    /// Conditional deoptimization guard; payload-free, condition is input 0.
    DeoptimizeIf,
    /// Unconditional deoptimization; materializes every object captured transitively by its
    /// SaveState chain.
    Deoptimize,
    /// Reference equality/inequality compare. Payload: [`InstData::Compare`].
    CompareRef,
    /// Width-changing cast. Payload-free; `ty` on the instruction is the destination type.
    Cast,

    // --- phi / control flow ---
    /// SSA phi: one input per predecessor, in predecessor order.
    Phi,
    /// Unconditional jump to a single successor.
    Jump,
    /// Conditional branch on a boolean input to two successors (true, false).
    If,
    /// Return a value.
    Return,
    /// Return with no value.
    ReturnVoid,

    // --- calls ---
    /// An ordinary (non-inlined) call. Payload: [`InstData::CallTarget`].
    Call,
    /// The entry marker of an inlined call; balanced by a matching `ReturnInlined` on every
    /// path. Payload: [`InstData::CallTarget`].
    CallInlined,
    /// The exit marker of an inlined call.
    ReturnInlined,

    // --- safepoints ---
    /// Captures interpreter state at an arbitrary safepoint.
    SaveState,
    /// Captures interpreter state at a call/allocation that may trigger GC or deopt.
    SafePoint,
    /// Captures interpreter state specifically for a deoptimization exit.
    SaveStateDeoptimize,

    /// Any frontend opcode this crate has no dedicated transfer function for.
    Generic,
}

impl Opcode {
    /// Does this opcode define a terminator instruction (ends a basic block)?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::If
                | Opcode::Return
                | Opcode::ReturnVoid
                | Opcode::Deoptimize
        )
    }

    /// Does this opcode load from the heap?
    pub fn is_load(self) -> bool {
        matches!(
            self,
            Opcode::LoadObject
                | Opcode::LoadArray
                | Opcode::LoadArrayI
                | Opcode::LoadArrayPair
                | Opcode::LoadArrayPairI
                | Opcode::LoadPairPart
        )
    }

    /// Does this opcode store to the heap?
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Opcode::StoreObject
                | Opcode::StoreArray
                | Opcode::StoreArrayI
                | Opcode::StoreArrayPair
                | Opcode::StoreArrayPairI
        )
    }

    /// Is this one of the array memory ops memory coalescing pairs up?
    pub fn is_array_memory_op(self) -> bool {
        matches!(
            self,
            Opcode::LoadArray | Opcode::StoreArray | Opcode::LoadArrayI | Opcode::StoreArrayI
        )
    }

    /// Does this opcode allocate a new object?
    pub fn is_allocation(self) -> bool {
        matches!(self, Opcode::NewObject | Opcode::NewArray | Opcode::InitObject)
    }

    /// Is this a save-state-family pseudo instruction?
    pub fn is_save_state(self) -> bool {
        matches!(
            self,
            Opcode::SaveState | Opcode::SafePoint | Opcode::SaveStateDeoptimize
        )
    }

    /// Does this opcode clobber caller-saved registers across its execution (a call boundary,
    /// for register-allocator callee-saved biasing)?
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallInlined)
    }

    /// Can this instruction throw an exception?
    pub fn can_throw(self) -> bool {
        matches!(
            self,
            Opcode::NullCheck | Opcode::LoadArray | Opcode::StoreArray | Opcode::Call
        )
    }

    /// Can this instruction trigger a deoptimization?
    pub fn can_deoptimize(self) -> bool {
        matches!(self, Opcode::NullCheck | Opcode::DeoptimizeIf | Opcode::Deoptimize)
    }

    /// Does this opcode act as a memory barrier that invalidates all coalescing candidates?
    pub fn is_barrier(self) -> bool {
        matches!(self, Opcode::Call | Opcode::SaveStateDeoptimize)
    }

    /// Does this instruction require a `SaveState` input?
    pub fn requires_state(self) -> bool {
        matches!(
            self,
            Opcode::NewObject
                | Opcode::NewArray
                | Opcode::InitObject
                | Opcode::Call
                | Opcode::CallInlined
                | Opcode::NullCheck
                | Opcode::DeoptimizeIf
                | Opcode::Deoptimize
                | Opcode::LoadArray
                | Opcode::StoreArray
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
