//! A single linear position space over the whole graph, built from RPO block order.

use crate::ir::{BlockId, Graph, InstId};
use std::collections::HashMap;

/// A position in the linear order. Each instruction gets two positions, `2n` ("use") and
/// `2n+1` ("def"), following the classic linear-scan convention: a value's definition
/// happens at its instruction's def position, and its uses at their consuming instructions'
/// use positions, which keeps an interval half-open `[start, end)` even when a value is
/// defined and immediately (same-instruction) consumed by nothing else.
pub type Position = u32;

/// Maps every instruction (and the start/end of every block) to a position in one global
/// linear order, built by walking blocks in RPO and, within a block, phis then regular
/// instructions in program order.
#[derive(Debug, Default)]
pub struct LinearOrder {
    inst_pos: HashMap<InstId, Position>,
    block_start: HashMap<BlockId, Position>,
    block_end: HashMap<BlockId, Position>,
    order: Vec<InstId>,
}

impl LinearOrder {
    /// Build the linear order for `graph`, using its cached RPO.
    pub fn build(graph: &mut Graph) -> Self {
        let rpo = graph.rpo().to_vec();
        let mut this = Self::default();
        let mut pos: Position = 0;
        for block in rpo {
            this.block_start.insert(block, pos);
            for &phi in graph.block(block).phis() {
                this.inst_pos.insert(phi, pos);
                this.order.push(phi);
                pos += 2;
            }
            for &inst in graph.block(block).insts() {
                this.inst_pos.insert(inst, pos);
                this.order.push(inst);
                pos += 2;
            }
            this.block_end.insert(block, pos);
        }
        this
    }

    /// The "def" position of `inst` (its own position); `def_pos + 1` is conventionally its
    /// "use" position for any input it consumes internally (not applicable to a sea-of-nodes
    /// IR with no multi-def instructions, but kept for the classic linear-scan shape).
    pub fn position_of(&self, inst: InstId) -> Position {
        self.inst_pos[&inst]
    }

    /// The first position in `block`.
    pub fn block_start(&self, block: BlockId) -> Position {
        self.block_start[&block]
    }

    /// The position just past the last instruction in `block`.
    pub fn block_end(&self, block: BlockId) -> Position {
        self.block_end[&block]
    }

    /// All instructions, in linear order.
    pub fn order(&self) -> &[InstId] {
        &self.order
    }
}
