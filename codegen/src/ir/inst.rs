//! `Inst`: a typed sea-of-nodes value.

use crate::ir::opcode::{CompareCond, Opcode};
use crate::ir::{BlockId, DataType, InstId};
use crate::runtime::{ClassPtr, FieldPtr, MethodRef};
use smallvec::SmallVec;
use std::fmt;

/// One operand slot: an edge to the producing instruction plus the type the consumer
/// expects to see on that edge (usually equal to the producer's type, but a narrowing or
/// widening relationship is legal and gets reconciled with an explicit `Cast` where the
/// width actually matters, e.g. scalar replacement's phi-input fixup in  4.3 step 7).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Input {
    /// The producing instruction.
    pub value: InstId,
    /// The type this input slot expects.
    pub input_type: DataType,
}

impl Input {
    /// Build an input edge.
    pub fn new(value: InstId, input_type: DataType) -> Self {
        Self { value, input_type }
    }
}

/// A single user-edge record: `user` consumes this instruction's value through its input
/// slot number `slot`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UserEdge {
    /// The consuming instruction.
    pub user: InstId,
    /// Index into `user`'s input list.
    pub slot: u16,
}

/// Bit flags carried by every instruction.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct InstFlags(u32);

macro_rules! inst_flag_bits {
    ($( $name:ident = $bit:expr ),* $(,)?) => {
        impl InstFlags {
            $(
                #[allow(non_upper_case_globals)]
                const $name: u32 = 1 << $bit;
            )*

            paste_getters!($( $name ),*);
        }
    };
}

macro_rules! paste_getters {
    ($( $name:ident ),*) => {
        $(
            #[allow(non_snake_case)]
            #[doc = concat!("Query the `", stringify!($name), "` flag.")]
        )*
    };
}

inst_flag_bits! {
    NoDce = 0,
    Terminator = 1,
    CanThrow = 2,
    CanDeoptimize = 3,
    Barrier = 4,
    RequiresState = 5,
    CatchInput = 6,
    Inlined = 7,
    IsStore = 8,
    IsLoad = 9,
    IsCall = 10,
    MovableObject = 11,
}

impl InstFlags {
    /// The empty flag set.
    pub fn empty() -> Self {
        Self(0)
    }

    fn set(&mut self, bit: u32, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    fn get(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Instruction must not be dead-code-eliminated even with no users (e.g. calls with
    /// side effects, stores).
    pub fn no_dce(&self) -> bool {
        self.get(Self::NoDce)
    }
    /// Set `no_dce`.
    pub fn set_no_dce(&mut self, v: bool) {
        self.set(Self::NoDce, v)
    }
    /// Ends its basic block.
    pub fn terminator(&self) -> bool {
        self.get(Self::Terminator)
    }
    /// Set `terminator`.
    pub fn set_terminator(&mut self, v: bool) {
        self.set(Self::Terminator, v)
    }
    /// Can raise an exception.
    pub fn can_throw(&self) -> bool {
        self.get(Self::CanThrow)
    }
    /// Set `can_throw`.
    pub fn set_can_throw(&mut self, v: bool) {
        self.set(Self::CanThrow, v)
    }
    /// Can deoptimize.
    pub fn can_deoptimize(&self) -> bool {
        self.get(Self::CanDeoptimize)
    }
    /// Set `can_deoptimize`.
    pub fn set_can_deoptimize(&mut self, v: bool) {
        self.set(Self::CanDeoptimize, v)
    }
    /// Acts as a memory/optimization barrier.
    pub fn barrier(&self) -> bool {
        self.get(Self::Barrier)
    }
    /// Set `barrier`.
    pub fn set_barrier(&mut self, v: bool) {
        self.set(Self::Barrier, v)
    }
    /// Has a `SaveState` input (kept in sync with `Inst::save_state`).
    pub fn requires_state(&self) -> bool {
        self.get(Self::RequiresState)
    }
    /// Set `requires_state`.
    pub fn set_requires_state(&mut self, v: bool) {
        self.set(Self::RequiresState, v)
    }
    /// Consumes the catch-block's exception value.
    pub fn catch_input(&self) -> bool {
        self.get(Self::CatchInput)
    }
    /// Set `catch_input`.
    pub fn set_catch_input(&mut self, v: bool) {
        self.set(Self::CatchInput, v)
    }
    /// Originates from an inlined callee.
    pub fn inlined(&self) -> bool {
        self.get(Self::Inlined)
    }
    /// Set `inlined`.
    pub fn set_inlined(&mut self, v: bool) {
        self.set(Self::Inlined, v)
    }
    /// Stores to memory.
    pub fn is_store(&self) -> bool {
        self.get(Self::IsStore)
    }
    /// Set `is_store`.
    pub fn set_is_store(&mut self, v: bool) {
        self.set(Self::IsStore, v)
    }
    /// Loads from memory.
    pub fn is_load(&self) -> bool {
        self.get(Self::IsLoad)
    }
    /// Set `is_load`.
    pub fn set_is_load(&mut self, v: bool) {
        self.set(Self::IsLoad, v)
    }
    /// Is a call.
    pub fn is_call(&self) -> bool {
        self.get(Self::IsCall)
    }
    /// Set `is_call`.
    pub fn set_is_call(&mut self, v: bool) {
        self.set(Self::IsCall, v)
    }
    /// Produces a reference that may be a scalar-replacement candidate.
    pub fn movable_object(&self) -> bool {
        self.get(Self::MovableObject)
    }
    /// Set `movable_object`.
    pub fn set_movable_object(&mut self, v: bool) {
        self.set(Self::MovableObject, v)
    }

    /// Derive the flag set implied by `opcode` alone (before any pass-specific
    /// fixups like `no_dce` on a store or `movable_object` on an allocation).
    pub fn from_opcode(opcode: Opcode) -> Self {
        let mut flags = Self::empty();
        flags.set_terminator(opcode.is_terminator());
        flags.set_can_throw(opcode.can_throw());
        flags.set_can_deoptimize(opcode.can_deoptimize());
        flags.set_barrier(opcode.is_barrier());
        flags.set_requires_state(opcode.requires_state());
        flags.set_inlined(matches!(opcode, Opcode::CallInlined | Opcode::ReturnInlined));
        flags.set_is_store(opcode.is_store());
        flags.set_is_load(opcode.is_load());
        flags.set_is_call(matches!(opcode, Opcode::Call | Opcode::CallInlined));
        flags.set_movable_object(opcode.is_allocation());
        flags.set_no_dce(opcode.is_store() || matches!(opcode, Opcode::Call | Opcode::CallInlined));
        flags
    }
}

impl fmt::Debug for InstFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InstFlags({:#x})", self.0)
    }
}

/// A field reference on an object, tagged so [`crate::pea::state::Field`] can distinguish
/// object fields from array slots without a separate enum at this layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    /// Opaque field handle minted by the [`crate::runtime::Runtime`].
    pub field: FieldPtr,
    /// Class id that declares this field, used to disambiguate shadowed fields.
    pub class_id: u32,
}

/// Opcode-specific payload carried alongside an instruction's generic fields.
#[derive(Clone, PartialEq, Debug)]
pub enum InstData {
    /// No extra payload.
    None,
    /// `Opcode::Constant`.
    Constant(ConstantValue),
    /// `Opcode::Parameter`: the parameter's ordinal position.
    Param(u32),
    /// `Opcode::NewObject` / `Opcode::NewArray` / `Opcode::InitObject`.
    ClassRef(ClassPtr),
    /// `Opcode::LoadObject` / `Opcode::StoreObject`.
    FieldAccess(FieldRef),
    /// `Opcode::LoadArrayI` / `Opcode::StoreArrayI`: the constant element index.
    ConstIndex(i64),
    /// `Opcode::CompareRef` (and friends): the condition code.
    Compare(CompareCond),
    /// `Opcode::Call` / `Opcode::CallInlined`.
    CallTarget(MethodRef),
    /// `Opcode::LoadArrayPair` family: the two original instructions that were fused,
    /// used to carry over their barrier/throw/deopt flags (unioned) and to re-bridge
    /// SaveStates after the rewrite.
    PairInfo { first: InstId, second: InstId },
    /// `Opcode::LoadPairPart`: which half of the pair this projects (0 or 1).
    PairPart(u8),
    /// An intrinsic id, for frontend-recognized intrinsics this crate does not interpret.
    Intrinsic(u32),
}

/// A constant value, tagged by representation rather than by `DataType` so a `0i64` and a
/// `0.0f64` are never accidentally compared equal.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ConstantValue {
    /// Boolean constant.
    Bool(bool),
    /// Integer constant, sign-extended to 64 bits; `ty` on the instruction says the width.
    Int(i64),
    /// Floating point constant.
    Float(f64),
    /// The null reference constant.
    Null,
}

/// A typed sea-of-nodes value: one instruction, one definition.
#[derive(Clone, Debug)]
pub struct Inst {
    id: InstId,
    opcode: Opcode,
    ty: DataType,
    block: Option<BlockId>,
    inputs: SmallVec<[Input; 4]>,
    users: SmallVec<[UserEdge; 4]>,
    flags: InstFlags,
    save_state: Option<InstId>,
    data: InstData,
    /// Register/stack-slot location assigned by the register allocator; `None` before
    /// allocation runs.
    pub location: Option<crate::regalloc::register_set::Location>,
    /// Block successor list for terminators that don't carry it in `data` (kept in the
    /// block's own successor vector; terminators still record their jump targets here for
    /// cheap local queries without walking back through the block).
    pub branch_targets: SmallVec<[BlockId; 2]>,
    /// Whether an explicit `Return param0` style dataflow is still backed by a real
    /// instruction in the graph, or the alias has been removed as dead after scalar
    /// replacement's alias-rewrite step. Cleared by `Graph::remove_inst`.
    pub in_graph: bool,
}

impl Inst {
    /// Construct a new instruction. The caller (normally [`crate::ir::Graph::append_inst`])
    /// is responsible for giving it a dense id and linking it into a block.
    pub fn new(id: InstId, opcode: Opcode, ty: DataType) -> Self {
        Self {
            id,
            flags: InstFlags::from_opcode(opcode),
            opcode,
            ty,
            block: None,
            inputs: SmallVec::new(),
            users: SmallVec::new(),
            save_state: None,
            data: InstData::None,
            location: None,
            branch_targets: SmallVec::new(),
            in_graph: true,
        }
    }

    /// This instruction's id (also its SSA value identity).
    pub fn id(&self) -> InstId {
        self.id
    }

    /// The opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Change the opcode in place (used when folding, e.g. `CompareRef` to a constant bool,
    /// where the instruction is turned into an equivalent `Constant`).
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.opcode = opcode;
        self.flags = InstFlags::from_opcode(opcode);
    }

    /// The result type.
    pub fn ty(&self) -> DataType {
        self.ty
    }

    /// Set the result type (used by `Cast` insertion and phi-type reconciliation).
    pub fn set_ty(&mut self, ty: DataType) {
        self.ty = ty;
    }

    /// Is this instruction typed as a GC-visible reference?
    pub fn is_reference(&self) -> bool {
        self.ty.is_reference()
    }

    /// The block this instruction is linked into, if any.
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Set the owning block. Only `Graph`'s mutation API should call this.
    pub fn set_block(&mut self, block: Option<BlockId>) {
        self.block = block;
    }

    /// Read-only view of the input list.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Read-only view of the user-edge list.
    pub fn users(&self) -> &[UserEdge] {
        &self.users
    }

    /// Instructions that use this value, deduplicated by instruction id (a user can consume
    /// the same value through more than one input slot, e.g. `x + x`).
    pub fn user_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        let mut seen: SmallVec<[InstId; 4]> = SmallVec::new();
        self.users.iter().filter_map(move |e| {
            if seen.contains(&e.user) {
                None
            } else {
                seen.push(e.user);
                Some(e.user)
            }
        })
    }

    /// Number of distinct user-edges (not deduplicated).
    pub fn use_count(&self) -> usize {
        self.users.len()
    }

    /// Does this value have no users and is not flagged `no_dce`?
    pub fn is_dead(&self) -> bool {
        self.users.is_empty() && !self.flags.no_dce()
    }

    /// Append a new input slot, returning its index. Does not update the producer's user
    /// list -- callers within `Graph` that also need use/def symmetry should go through
    /// `Graph::append_input` instead.
    pub(crate) fn push_input_raw(&mut self, input: Input) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    pub(crate) fn set_input_raw(&mut self, slot: usize, value: InstId) {
        self.inputs[slot].value = value;
    }

    pub(crate) fn push_user_raw(&mut self, edge: UserEdge) {
        self.users.push(edge);
    }

    pub(crate) fn remove_user_raw(&mut self, user: InstId, slot: u16) {
        if let Some(pos) = self
            .users
            .iter()
            .position(|e| e.user == user && e.slot == slot)
        {
            self.users.swap_remove(pos);
        }
    }

    pub(crate) fn clear_users(&mut self) {
        self.users.clear();
    }

    pub(crate) fn take_users(&mut self) -> SmallVec<[UserEdge; 4]> {
        std::mem::take(&mut self.users)
    }

    /// Detach every input slot, returning what was there. Leaves the instruction linked in
    /// its block; the caller is responsible for also clearing the producers' user edges (see
    /// `Graph::fold_to_constant`).
    pub(crate) fn take_inputs(&mut self) -> SmallVec<[Input; 4]> {
        std::mem::take(&mut self.inputs)
    }

    /// Flags.
    pub fn flags(&self) -> &InstFlags {
        &self.flags
    }

    /// Mutable flags.
    pub fn flags_mut(&mut self) -> &mut InstFlags {
        &mut self.flags
    }

    /// This instruction's `SaveState` input, if `requires_state()` holds. Per the IR's
    /// invariant, this is always pointer-equal to the `SaveState`-opcode entry in `inputs`.
    pub fn save_state(&self) -> Option<InstId> {
        self.save_state
    }

    /// Attach (or clear) a `SaveState`. The caller must also have added (or removed) the
    /// matching input edge; `Graph::set_save_state` does both together.
    pub fn set_save_state_raw(&mut self, save_state: Option<InstId>) {
        self.save_state = save_state;
        self.flags.set_requires_state(save_state.is_some());
    }

    /// Opcode-specific payload.
    pub fn data(&self) -> &InstData {
        &self.data
    }

    /// Mutable opcode-specific payload.
    pub fn data_mut(&mut self) -> &mut InstData {
        &mut self.data
    }

    /// Set the opcode-specific payload.
    pub fn set_data(&mut self, data: InstData) {
        self.data = data;
    }

    /// Does this instruction read from a virtualizable base (a `LoadObject`/`StoreObject`
    /// on input 0, or a `LoadArray(I)`/`StoreArray(I)` on input 0)? Used pervasively by PEA.
    pub fn base_input(&self) -> Option<InstId> {
        self.inputs.first().map(|i| i.value)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {} {}", self.id, self.opcode, self.ty)?;
        if !self.inputs.is_empty() {
            write!(f, " (")?;
            for (i, input) in self.inputs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", input.value)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
