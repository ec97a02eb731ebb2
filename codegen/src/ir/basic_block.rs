//! `BasicBlock`: a node in the control flow graph.

use crate::ir::{BlockId, InstId};
use smallvec::SmallVec;

/// Bit flags carried by a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u16);

impl BlockFlags {
    const START: u16 = 1 << 0;
    const END: u16 = 1 << 1;
    const TRY_BEGIN: u16 = 1 << 2;
    const TRY_END: u16 = 1 << 3;
    const CATCH_BEGIN: u16 = 1 << 4;
    const OSR_ENTRY: u16 = 1 << 5;
    const EMPTY: u16 = 1 << 6;
    const NEEDS_JUMP: u16 = 1 << 7;

    fn set(&mut self, bit: u16, v: bool) {
        if v {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    fn get(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    /// The graph's single entry block.
    pub fn start(&self) -> bool {
        self.get(Self::START)
    }
    /// Set `start`.
    pub fn set_start(&mut self, v: bool) {
        self.set(Self::START, v)
    }
    /// The graph's single exit block.
    pub fn end(&self) -> bool {
        self.get(Self::END)
    }
    /// Set `end`.
    pub fn set_end(&mut self, v: bool) {
        self.set(Self::END, v)
    }
    /// First block of a try region.
    pub fn try_begin(&self) -> bool {
        self.get(Self::TRY_BEGIN)
    }
    /// Set `try_begin`.
    pub fn set_try_begin(&mut self, v: bool) {
        self.set(Self::TRY_BEGIN, v)
    }
    /// Last block of a try region.
    pub fn try_end(&self) -> bool {
        self.get(Self::TRY_END)
    }
    /// Set `try_end`.
    pub fn set_try_end(&mut self, v: bool) {
        self.set(Self::TRY_END, v)
    }
    /// Entry block of a catch handler; `catch_input` inputs on its first instructions
    /// consume the exception value.
    pub fn catch_begin(&self) -> bool {
        self.get(Self::CATCH_BEGIN)
    }
    /// Set `catch_begin`.
    pub fn set_catch_begin(&mut self, v: bool) {
        self.set(Self::CATCH_BEGIN, v)
    }
    /// On-stack-replacement entry point.
    pub fn osr_entry(&self) -> bool {
        self.get(Self::OSR_ENTRY)
    }
    /// Set `osr_entry`.
    pub fn set_osr_entry(&mut self, v: bool) {
        self.set(Self::OSR_ENTRY, v)
    }
    /// No instructions (not even a terminator) -- a pass-through block pending cleanup.
    pub fn empty(&self) -> bool {
        self.get(Self::EMPTY)
    }
    /// Set `empty`.
    pub fn set_empty(&mut self, v: bool) {
        self.set(Self::EMPTY, v)
    }
    /// Falls through to its single successor and needs an explicit `Jump` appended before
    /// codegen (set transiently by block-splitting operations).
    pub fn needs_jump(&self) -> bool {
        self.get(Self::NEEDS_JUMP)
    }
    /// Set `needs_jump`.
    pub fn set_needs_jump(&mut self, v: bool) {
        self.set(Self::NEEDS_JUMP, v)
    }
}

/// A node in the control flow graph: an ordered phi list, an ordered instruction list, and
/// edges to predecessor/successor blocks.
///
/// Predecessor and successor lists are plain `Vec`s (the spec's data model calls for this
/// directly) rather than an intrusive forest: blocks rarely have more than a handful of
/// edges, and linear scans over them are not a hot path relative to the per-instruction
/// analyses that dominate compile time.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    id: BlockId,
    preds: SmallVec<[BlockId; 4]>,
    succs: SmallVec<[BlockId; 2]>,
    phis: Vec<InstId>,
    insts: Vec<InstId>,
    flags: BlockFlags,
    /// Immediate dominator, filled in by `DominatorTree`.
    pub idom: Option<BlockId>,
    /// The innermost natural loop containing this block, filled in by `LoopTree`.
    pub loop_header: Option<BlockId>,
    /// Nesting depth of that loop (0 if not in any loop).
    pub loop_depth: u32,
    /// Guest bytecode program counter this block originated from, for diagnostics only.
    pub guest_pc: Option<u32>,
}

impl BasicBlock {
    /// Construct an empty block with no edges.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            phis: Vec::new(),
            insts: Vec::new(),
            flags: BlockFlags::default(),
            idom: None,
            loop_header: None,
            loop_depth: 0,
            guest_pc: None,
        }
    }

    /// This block's id.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Predecessor blocks, in the order phi inputs are indexed against.
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successor blocks. For an `If` terminator, index 0 is the true target and index 1 is
    /// the false target; for `Jump`, index 0 is the only target.
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    pub(crate) fn push_pred(&mut self, pred: BlockId) {
        self.preds.push(pred);
    }

    pub(crate) fn push_succ(&mut self, succ: BlockId) {
        self.succs.push(succ);
    }

    pub(crate) fn remove_pred(&mut self, pred: BlockId) {
        if let Some(pos) = self.preds.iter().position(|&p| p == pred) {
            self.preds.remove(pos);
        }
    }

    pub(crate) fn remove_succ(&mut self, succ: BlockId) {
        if let Some(pos) = self.succs.iter().position(|&s| s == succ) {
            self.succs.remove(pos);
        }
    }

    pub(crate) fn replace_succ(&mut self, old: BlockId, new: BlockId) {
        for s in self.succs.iter_mut() {
            if *s == old {
                *s = new;
            }
        }
    }

    pub(crate) fn replace_pred(&mut self, old: BlockId, new: BlockId) {
        for p in self.preds.iter_mut() {
            if *p == old {
                *p = new;
            }
        }
    }

    /// Phi instructions at the head of this block, in declaration order.
    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    /// Push a new phi to the end of the phi list.
    pub fn push_phi(&mut self, phi: InstId) {
        self.phis.push(phi);
    }

    /// Remove a phi from the phi list.
    pub fn remove_phi(&mut self, phi: InstId) {
        if let Some(pos) = self.phis.iter().position(|&p| p == phi) {
            self.phis.remove(pos);
        }
    }

    /// Regular (non-phi) instructions, in program order; the last one is the terminator once
    /// the block is well-formed.
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// The terminator instruction, if the block is well-formed and non-empty.
    pub fn terminator(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    /// Append an instruction to the end of the regular instruction list.
    pub fn push_inst(&mut self, inst: InstId) {
        self.insts.push(inst);
    }

    /// Insert an instruction immediately before `before` in the regular instruction list.
    pub fn insert_before(&mut self, before: InstId, inst: InstId) {
        let pos = self
            .insts
            .iter()
            .position(|&i| i == before)
            .expect("insert_before: anchor not in block");
        self.insts.insert(pos, inst);
    }

    /// Insert an instruction immediately after `after` in the regular instruction list.
    pub fn insert_after(&mut self, after: InstId, inst: InstId) {
        let pos = self
            .insts
            .iter()
            .position(|&i| i == after)
            .expect("insert_after: anchor not in block");
        self.insts.insert(pos + 1, inst);
    }

    /// Remove an instruction from the regular instruction list.
    pub fn remove_inst(&mut self, inst: InstId) {
        if let Some(pos) = self.insts.iter().position(|&i| i == inst) {
            self.insts.remove(pos);
        }
    }

    /// Split the regular instruction list in two at the position right after `after`,
    /// returning the tail that should move to a new block.
    pub fn split_after(&mut self, after: InstId) -> Vec<InstId> {
        let pos = self
            .insts
            .iter()
            .position(|&i| i == after)
            .expect("split_after: anchor not in block");
        self.insts.split_off(pos + 1)
    }

    /// Replace the regular instruction list outright. Used when moving a split-off tail into
    /// a freshly created block that has no instructions of its own yet.
    pub fn set_insts(&mut self, insts: Vec<InstId>) {
        self.insts = insts;
    }

    /// Empty out the regular instruction list, returning what was there. Used when undoing a
    /// split by folding a block back into its sole predecessor.
    pub(crate) fn take_insts(&mut self) -> Vec<InstId> {
        std::mem::take(&mut self.insts)
    }

    /// Flags.
    pub fn flags(&self) -> &BlockFlags {
        &self.flags
    }

    /// Mutable flags.
    pub fn flags_mut(&mut self) -> &mut BlockFlags {
        &mut self.flags
    }

    /// Does this block end in an `If`/`Jump` style terminator with more than one successor
    /// (i.e. is it a branch point)?
    pub fn is_branch(&self) -> bool {
        self.succs.len() > 1
    }
}
