//! Natural loop detection, built on the dominator tree.

use crate::ir::{BlockId, Graph};
use std::collections::{HashMap, HashSet};

/// One natural loop: a header block plus the set of blocks in its body (including nested
/// inner loops' blocks).
#[derive(Debug, Clone)]
pub struct Loop {
    /// The loop header: the single block dominating every block in the loop, the target of
    /// the loop's back edge.
    pub header: BlockId,
    /// All blocks in the loop body, including the header and any nested loops' blocks.
    pub body: HashSet<BlockId>,
    /// The loop immediately enclosing this one, if nested.
    pub parent: Option<BlockId>,
    /// Nesting depth, 1 for an outermost loop.
    pub depth: u32,
}

/// The set of natural loops in a [`Graph`], keyed by header block.
///
/// Escape analysis's loop handling ( 4.2) is bounded by `Flags::max_loop_nesting_depth`
/// against the depths recorded here: a graph whose deepest loop nest exceeds the budget
/// makes the pass report `PassCannotComplete` rather than iterate unboundedly.
#[derive(Debug, Default)]
pub struct LoopTree {
    loops: HashMap<BlockId, Loop>,
}

impl LoopTree {
    /// Find natural loops by back-edge detection against the dominator tree, then assign
    /// nesting depth and parent relationships by containment.
    pub fn compute(graph: &mut Graph) -> Self {
        let rpo = graph.rpo().to_vec();
        let dom = graph.dominator_tree();

        let mut back_edges: Vec<(BlockId, BlockId)> = Vec::new();
        for &block in &rpo {
            for &succ in graph.block(block).succs() {
                if dom.is_reachable(block) && dom.dominates(succ, block) {
                    back_edges.push((block, succ));
                }
            }
        }

        let mut loops: HashMap<BlockId, Loop> = HashMap::new();
        for (tail, header) in back_edges {
            let entry = loops.entry(header).or_insert_with(|| Loop {
                header,
                body: HashSet::from([header]),
                parent: None,
                depth: 1,
            });
            let mut body = std::mem::take(&mut entry.body);
            natural_loop_body(graph, header, tail, &mut body);
            loops.get_mut(&header).unwrap().body = body;
        }

        // Assign nesting by containment: a loop L1 is nested in L2 if L1's header (other
        // than L2's own) lies in L2's body.
        let headers: Vec<BlockId> = loops.keys().copied().collect();
        for &h in &headers {
            let mut best_parent: Option<BlockId> = None;
            let mut best_size = usize::MAX;
            for &other in &headers {
                if other == h {
                    continue;
                }
                if loops[&other].body.contains(&h) && loops[&other].body.len() < best_size {
                    best_parent = Some(other);
                    best_size = loops[&other].body.len();
                }
            }
            loops.get_mut(&h).unwrap().parent = best_parent;
        }
        for &h in &headers {
            let mut depth = 1;
            let mut cur = loops[&h].parent;
            while let Some(p) = cur {
                depth += 1;
                cur = loops[&p].parent;
            }
            loops.get_mut(&h).unwrap().depth = depth;
        }

        for &h in &headers {
            let depth = loops[&h].depth;
            for &b in loops[&h].body.clone().iter() {
                let block = graph.block_mut(b);
                if block.loop_header.is_none() || loops[&block.loop_header.unwrap()].body.len() > loops[&h].body.len()
                {
                    block.loop_header = Some(h);
                    block.loop_depth = depth;
                }
            }
        }

        Self { loops }
    }

    /// The loop headed by `header`, if any.
    pub fn get(&self, header: BlockId) -> Option<&Loop> {
        self.loops.get(&header)
    }

    /// All loop headers, in no particular order.
    pub fn headers(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.loops.keys().copied()
    }

    /// Maximum nesting depth across every loop in the graph (0 if there are none).
    pub fn max_depth(&self) -> u32 {
        self.loops.values().map(|l| l.depth).max().unwrap_or(0)
    }

    /// Is `block` inside the natural loop headed by `header`?
    pub fn contains(&self, header: BlockId, block: BlockId) -> bool {
        self.loops.get(&header).map(|l| l.body.contains(&block)).unwrap_or(false)
    }
}

/// Walk predecessors backward from `tail` up to `header`, collecting every block found into
/// `body` (the standard natural-loop-body algorithm).
fn natural_loop_body(graph: &Graph, header: BlockId, tail: BlockId, body: &mut HashSet<BlockId>) {
    let mut worklist = vec![tail];
    body.insert(header);
    body.insert(tail);
    while let Some(b) = worklist.pop() {
        for &pred in graph.block(b).preds() {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
}
