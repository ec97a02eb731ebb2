//! Convenience builder for constructing graphs by hand (used by tests and by a frontend
//! lowering bytecode into this IR).

use crate::ir::{BlockId, DataType, Graph, InstData, InstId, Opcode};

/// A thin wrapper over [`Graph`]'s low-level arena API that tracks "current block" the way a
/// frontend emitting one bytecode instruction after another would, so call sites read as a
/// straight-line sequence instead of threading `BlockId`s through every call.
pub struct GraphBuilder<'g> {
    graph: &'g mut Graph,
    current: Option<BlockId>,
}

impl<'g> GraphBuilder<'g> {
    /// Start building into `graph`.
    pub fn new(graph: &'g mut Graph) -> Self {
        Self { graph, current: None }
    }

    /// Create a new block and make it current.
    pub fn create_block(&mut self) -> BlockId {
        let b = self.graph.create_block();
        self.current = Some(b);
        b
    }

    /// Switch the block subsequent `append_*` calls target.
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    fn current(&self) -> BlockId {
        self.current.expect("GraphBuilder: no current block")
    }

    /// Append a plain instruction with no inputs and no payload.
    pub fn append(&mut self, opcode: Opcode, ty: DataType) -> InstId {
        let inst = self.graph.make_inst(opcode, ty);
        self.graph.append_inst(self.current(), inst);
        inst
    }

    /// Append an instruction carrying a typed payload.
    pub fn append_with_data(&mut self, opcode: Opcode, ty: DataType, data: InstData) -> InstId {
        let inst = self.append(opcode, ty);
        self.graph.inst_mut(inst).set_data(data);
        inst
    }

    /// Add an input edge from the last-appended (or any) instruction to `producer`.
    pub fn add_input(&mut self, user: InstId, producer: InstId, ty: DataType) -> usize {
        self.graph.append_input(user, producer, ty)
    }

    /// Attach `save_state` to `user` as both an input and its dedicated SaveState pointer.
    pub fn attach_save_state(&mut self, user: InstId, save_state: InstId) {
        self.graph.set_save_state(user, save_state);
    }

    /// Append a `Phi` to the current block's phi list (phis are always prepended logically,
    /// but physically live in the block's separate phi list so ordering among regular
    /// instructions doesn't matter).
    pub fn append_phi(&mut self, ty: DataType) -> InstId {
        let inst = self.graph.make_inst(Opcode::Phi, ty);
        self.graph.append_inst(self.current(), inst);
        inst
    }

    /// Link a CFG edge from the current block to `to`.
    pub fn add_edge_to(&mut self, to: BlockId) {
        let from = self.current();
        self.graph.add_edge(from, to);
    }

    /// Borrow the underlying graph.
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Mutably borrow the underlying graph.
    pub fn graph_mut(&mut self) -> &mut Graph {
        self.graph
    }
}
