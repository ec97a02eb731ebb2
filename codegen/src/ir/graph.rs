//! `Graph`: the sea-of-nodes IR for one compiled method.

use crate::analysis::dominator_tree::DominatorTree;
use crate::analysis::loop_analysis::LoopTree;
use crate::error::{CoreError, CoreResult};
use crate::ir::basic_block::BasicBlock;
use crate::ir::entities::{BlockId, InstId};
use crate::ir::inst::{Input, Inst};
use crate::ir::opcode::Opcode;
use crate::ir::save_state::SaveStateInst;
use crate::ir::types::DataType;
use crate::marker::MarkerPool;
use crate::options::{Architecture, CompileMode, Flags};
use crate::runtime::Runtime;
use ark_entity::PrimaryMap;
use std::rc::Rc;

/// The sea-of-nodes IR for one method, plus everything a pass needs to mutate it safely:
/// the block/instruction arenas, lazily-computed analysis caches, a scoped marker-bit
/// allocator, and the embedder's [`Runtime`] capability.
///
/// Mirrors the shape of the teacher's `ir::Function` + `Context`, collapsed into one type
/// because this IR has no separate "layout" from "dataflow graph": blocks, instructions, and
/// their SSA edges are all owned by the same arenas.
pub struct Graph {
    blocks: PrimaryMap<BlockId, BasicBlock>,
    insts: PrimaryMap<InstId, Inst>,
    /// SaveState-family instructions' payloads, keyed by the instruction's own id: a
    /// `SaveState`/`SafePoint`/`SaveStateDeoptimize` is a 1:1 pairing of IR node and payload,
    /// so there's no need for a separate id space the way `StateId` gives PEA's abstract heap
    /// states one.
    save_states: std::collections::HashMap<InstId, SaveStateInst>,
    start: Option<BlockId>,
    end: Option<BlockId>,
    /// Reverse post-order of reachable blocks, filled in by `Graph::compute_rpo` and
    /// invalidated by any mutation that changes the CFG shape.
    rpo: Vec<BlockId>,
    rpo_valid: bool,
    dominators: Option<DominatorTree>,
    loops: Option<LoopTree>,
    markers: Rc<MarkerPool>,
    runtime: Box<dyn Runtime>,
    architecture: Architecture,
    mode: CompileMode,
    flags: Flags,
}

impl Graph {
    /// Build an empty graph with no blocks yet.
    pub fn new(runtime: Box<dyn Runtime>, flags: Flags) -> Self {
        Self {
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            save_states: std::collections::HashMap::new(),
            start: None,
            end: None,
            rpo: Vec::new(),
            rpo_valid: false,
            dominators: None,
            loops: None,
            markers: Rc::new(MarkerPool::new()),
            architecture: flags.architecture,
            mode: flags.mode,
            runtime,
            flags,
        }
    }

    /// Active optimization flags.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// Target architecture.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Compilation mode.
    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    /// The embedder's runtime capability.
    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    /// Acquire a scoped marker bit for a one-pass "visited" set.
    pub fn new_marker(&self) -> crate::marker::MarkerScope {
        crate::marker::MarkerScope::acquire(self.markers.clone())
    }

    // --- block arena ---

    /// Create a new, empty, unlinked block.
    pub fn create_block(&mut self) -> BlockId {
        let id = self.blocks.next_key();
        self.blocks.push(BasicBlock::new(id));
        self.rpo_valid = false;
        id
    }

    /// Read a block.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Mutably read a block. Callers outside `Graph` should prefer the dedicated mutation
    /// methods below, which keep predecessor/successor symmetry; this is for flag twiddling
    /// and analysis annotation writes only.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Number of blocks ever created (including any later removed by being orphaned).
    pub fn block_len(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate all block ids in creation order (not RPO).
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    /// The graph's single entry block.
    pub fn start_block(&self) -> BlockId {
        self.start.expect("graph has no start block yet")
    }

    /// Set the entry block.
    pub fn set_start_block(&mut self, block: BlockId) {
        self.blocks[block].flags_mut().set_start(true);
        self.start = Some(block);
    }

    /// The graph's single exit block, if control ever reaches one (a method that always
    /// throws has none).
    pub fn end_block(&self) -> Option<BlockId> {
        self.end
    }

    /// Set the exit block.
    pub fn set_end_block(&mut self, block: BlockId) {
        self.blocks[block].flags_mut().set_end(true);
        self.end = Some(block);
    }

    /// Link `from -> to` as a CFG edge.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].push_succ(to);
        self.blocks[to].push_pred(from);
        self.rpo_valid = false;
    }

    /// Remove the CFG edge `from -> to`.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].remove_succ(to);
        self.blocks[to].remove_pred(from);
        self.rpo_valid = false;
    }

    /// Repoint the edge `from -> old` to `from -> new`, for both the successor list on
    /// `from` and the predecessor list on `old`/`new`. Used by block splitting and
    /// critical-edge breaking.
    pub fn redirect_edge(&mut self, from: BlockId, old: BlockId, new: BlockId) {
        self.blocks[from].replace_succ(old, new);
        self.blocks[old].remove_pred(from);
        self.blocks[new].push_pred(from);
        self.rpo_valid = false;
    }

    // --- instruction arena ---

    /// Allocate a new instruction, not yet linked into any block.
    pub fn make_inst(&mut self, opcode: Opcode, ty: DataType) -> InstId {
        let id = self.insts.next_key();
        self.insts.push(Inst::new(id, opcode, ty));
        id
    }

    /// Read an instruction.
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id]
    }

    /// Mutably read an instruction. Prefer the dedicated edge-mutation methods for anything
    /// touching inputs/users/save-state so use-def symmetry is preserved.
    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id]
    }

    /// Number of instructions ever created.
    pub fn inst_len(&self) -> usize {
        self.insts.len()
    }

    /// Append `inst` to the end of `block`'s regular instruction list (or phi list, if
    /// `inst` is a `Phi`), and record `inst`'s owning block.
    pub fn append_inst(&mut self, block: BlockId, inst: InstId) {
        self.insts[inst].set_block(Some(block));
        if self.insts[inst].opcode() == Opcode::Phi {
            self.blocks[block].push_phi(inst);
        } else {
            self.blocks[block].push_inst(inst);
        }
    }

    /// Insert `inst` immediately before `before`, which must already be linked into a block.
    pub fn insert_before(&mut self, before: InstId, inst: InstId) {
        let block = self.insts[before]
            .block()
            .expect("insert_before: anchor has no block");
        self.insts[inst].set_block(Some(block));
        self.blocks[block].insert_before(before, inst);
    }

    /// Insert `inst` immediately after `after`, which must already be linked into a block.
    pub fn insert_after(&mut self, after: InstId, inst: InstId) {
        let block = self.insts[after]
            .block()
            .expect("insert_after: anchor has no block");
        self.insts[inst].set_block(Some(block));
        self.blocks[block].insert_after(after, inst);
    }

    /// Unlink `inst` from its block. Does not remove its use edges; callers that are
    /// deleting the instruction entirely should call `replace_users`/`remove_dead_inst`
    /// first to keep use-def symmetry.
    pub fn unlink_inst(&mut self, inst: InstId) {
        if let Some(block) = self.insts[inst].block() {
            if self.insts[inst].opcode() == Opcode::Phi {
                self.blocks[block].remove_phi(inst);
            } else {
                self.blocks[block].remove_inst(inst);
            }
        }
        self.insts[inst].set_block(None);
    }

    /// Split `block`'s regular instruction list right after `after`, moving everything past
    /// it into a freshly created block, and rewire the CFG so the new block inherits
    /// `block`'s old successors while `block` falls through into it.
    ///
    /// Used by memory coalescing and scalar replacement when a materialization or a fused
    /// pair instruction needs to be inserted between two halves of what was one block.
    pub fn split_block_after(&mut self, block: BlockId, after: InstId) -> BlockId {
        let new_block = self.create_block();
        let tail = self.blocks[block].split_after(after);
        for &inst in &tail {
            self.insts[inst].set_block(Some(new_block));
        }
        self.blocks[new_block].set_insts(tail);

        let old_succs: smallvec::SmallVec<[BlockId; 2]> = self.blocks[block].succs().into();
        for succ in old_succs {
            self.blocks[block].remove_succ(succ);
            self.blocks[succ].remove_pred(block);
            self.blocks[new_block].push_succ(succ);
            self.blocks[succ].push_pred(new_block);
        }
        self.add_edge(block, new_block);
        self.blocks[block].flags_mut().set_needs_jump(true);
        self.rpo_valid = false;
        new_block
    }

    /// Undo an earlier `split_block_after`: fold `child` back into `parent`, moving its
    /// instructions onto the end of `parent`'s list and reparenting its successors directly
    /// onto `parent`. `parent` must have `child` as its only successor. Used by escape
    /// analysis's decompose/compose when a deopt split turned out not to need its own block.
    pub fn merge_block_into(&mut self, parent: BlockId, child: BlockId) {
        self.remove_edge(parent, child);
        let tail = self.blocks[child].take_insts();
        for &inst in &tail {
            self.insts[inst].set_block(Some(parent));
            self.blocks[parent].push_inst(inst);
        }
        let succs: smallvec::SmallVec<[BlockId; 2]> = self.blocks[child].succs().into();
        for succ in succs {
            self.blocks[child].remove_succ(succ);
            self.blocks[succ].remove_pred(child);
            self.blocks[parent].push_succ(succ);
            self.blocks[succ].push_pred(parent);
        }
        self.blocks[parent].flags_mut().set_needs_jump(false);
        self.rpo_valid = false;
    }

    // --- use-def edges ---

    /// Append a new input edge `user -> producer` (typed `input_type`), recording the
    /// matching user-edge on `producer`. Returns the new input's slot index.
    pub fn append_input(&mut self, user: InstId, producer: InstId, input_type: DataType) -> usize {
        let slot = self.insts[user].push_input_raw(Input::new(producer, input_type));
        self.insts[producer].push_user_raw(crate::ir::inst::UserEdge {
            user,
            slot: slot as u16,
        });
        slot
    }

    /// Repoint input slot `slot` of `user` from its current producer to `new_producer`,
    /// updating both sides' use-def edges.
    pub fn set_input(&mut self, user: InstId, slot: usize, new_producer: InstId) {
        let old_producer = self.insts[user].inputs()[slot].value;
        self.insts[old_producer].remove_user_raw(user, slot as u16);
        self.insts[user].set_input_raw(slot, new_producer);
        self.insts[new_producer].push_user_raw(crate::ir::inst::UserEdge {
            user,
            slot: slot as u16,
        });
    }

    /// Repoint every use of `old` to `new`, leaving `old` with no users (a candidate for
    /// dead-code elimination unless it's `no_dce`). This is the core alias-rewrite primitive
    /// scalar replacement uses to replace uses of a virtualized reference with a
    /// materialized one, or with a field/phi value when the object itself is eliminated.
    pub fn replace_users(&mut self, old: InstId, new: InstId) {
        let edges = self.insts[old].take_users();
        for edge in &edges {
            self.insts[edge.user].set_input_raw(edge.slot as usize, new);
            self.insts[new].push_user_raw(*edge);
        }
    }

    /// Fold `inst` in place into a `Constant`, detaching every input edge (so the former
    /// producers no longer list `inst` as a user) while leaving `inst` linked in its block at
    /// the same position. Used by partial escape analysis's `CompareRef` fold: the compare
    /// becomes the folded boolean without moving it or touching its users.
    pub fn fold_to_constant(&mut self, inst: InstId, value: crate::ir::inst::InstData) {
        let inputs = self.insts[inst].take_inputs();
        for (slot, input) in inputs.iter().enumerate() {
            self.insts[input.value].remove_user_raw(inst, slot as u16);
        }
        self.insts[inst].set_save_state_raw(None);
        self.insts[inst].set_opcode(Opcode::Constant);
        self.insts[inst].set_data(value);
    }

    /// Attach `save_state` as an input and as the dedicated SaveState pointer on `user`.
    pub fn set_save_state(&mut self, user: InstId, save_state: InstId) {
        self.append_input(user, save_state, DataType::NoType);
        self.insts[user].set_save_state_raw(Some(save_state));
    }

    /// Remove an instruction that has no remaining users from its block and the arena's
    /// bookkeeping. Panics (a structural-invariant condition, caught by the graph checker in
    /// debug builds) if it still has users or is `no_dce`-flagged live code.
    pub fn remove_dead_inst(&mut self, inst: InstId) -> CoreResult<()> {
        if !self.insts[inst].users().is_empty() {
            return Err(CoreError::structural(
                "remove_dead_inst",
                format!("{} still has users", inst),
            ));
        }
        for i in 0..self.insts[inst].inputs().len() {
            let producer = self.insts[inst].inputs()[i].value;
            self.insts[producer].remove_user_raw(inst, i as u16);
        }
        self.insts[inst].clear_users();
        self.unlink_inst(inst);
        self.insts[inst].in_graph = false;
        Ok(())
    }

    // --- SaveState payload table ---

    /// Create (or reset) the SaveState payload belonging to SaveState-family instruction
    /// `inst`.
    pub fn bind_save_state_payload(&mut self, inst: InstId) -> &mut SaveStateInst {
        self.save_states.entry(inst).or_insert_with(SaveStateInst::new)
    }

    /// The SaveState payload belonging to SaveState-family instruction `inst`.
    pub fn save_state_payload(&self, inst: InstId) -> Option<&SaveStateInst> {
        self.save_states.get(&inst)
    }

    /// Mutably access the SaveState payload belonging to `inst`.
    pub fn save_state_payload_mut(&mut self, inst: InstId) -> Option<&mut SaveStateInst> {
        self.save_states.get_mut(&inst)
    }

    /// Read a SaveState payload by the id of its owning instruction, as used from
    /// [`SaveStateInst::inlining_depth`]'s walk back through caller frames.
    pub(crate) fn save_state_of(&self, inst: InstId) -> Option<&SaveStateInst> {
        self.save_states.get(&inst)
    }

    // --- traversal & analysis caches ---

    /// Reverse post-order of blocks reachable from the start block, recomputing if stale.
    pub fn rpo(&mut self) -> &[BlockId] {
        if !self.rpo_valid {
            self.rpo = crate::ir::rpo::compute_rpo(self);
            self.rpo_valid = true;
        }
        &self.rpo
    }

    /// Invalidate every cached analysis. Any pass that changes the CFG shape (adds/removes
    /// blocks or edges) must call this before a later pass reads `dominator_tree`/`loop_tree`.
    pub fn invalidate_analyses(&mut self) {
        self.rpo_valid = false;
        self.dominators = None;
        self.loops = None;
    }

    /// The dominator tree, computed lazily and cached until `invalidate_analyses` runs.
    pub fn dominator_tree(&mut self) -> &DominatorTree {
        if self.dominators.is_none() {
            let _ = self.rpo();
            let dt = DominatorTree::compute(self);
            self.dominators = Some(dt);
        }
        self.dominators.as_ref().unwrap()
    }

    /// The natural-loop tree, computed lazily from the dominator tree and cached until
    /// `invalidate_analyses` runs.
    pub fn loop_tree(&mut self) -> &LoopTree {
        if self.loops.is_none() {
            let _ = self.dominator_tree();
            let lt = LoopTree::compute(self);
            self.loops = Some(lt);
        }
        self.loops.as_ref().unwrap()
    }
}
