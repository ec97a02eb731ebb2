//! Dominator tree, computed with the Cooper/Harvey/Kennedy iterative algorithm.

use crate::ir::{BlockId, Graph};
use std::collections::HashMap;

/// The dominator tree of a [`Graph`]'s reachable blocks.
///
/// Built once per pass pipeline run and cached on `Graph` until a CFG-mutating pass calls
/// `Graph::invalidate_analyses`.
#[derive(Debug, Default)]
pub struct DominatorTree {
    idom: HashMap<BlockId, BlockId>,
    rpo_number: HashMap<BlockId, usize>,
}

impl DominatorTree {
    /// Compute the dominator tree of `graph`, using its cached RPO (the caller is expected to
    /// have already populated it, as `Graph::dominator_tree` does).
    pub fn compute(graph: &mut Graph) -> Self {
        let rpo = graph.rpo().to_vec();
        let mut rpo_number = HashMap::new();
        for (i, &b) in rpo.iter().enumerate() {
            rpo_number.insert(b, i);
        }

        let start = graph.start_block();
        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(start, start);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let preds = graph.block(block).preds();
                let mut new_idom: Option<BlockId> = None;
                for &pred in preds {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, &rpo_number, cur, pred),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        for (&block, &dom) in idom.iter() {
            if block != start {
                graph.block_mut(block).idom = Some(dom);
            }
        }

        Self { idom, rpo_number }
    }

    /// The immediate dominator of `block`, or `None` for the start block or an unreachable
    /// block.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let start_is_self = self.idom.get(&block).copied();
        match start_is_self {
            Some(d) if d == block => None,
            other => other,
        }
    }

    /// Does `a` dominate `b` (reflexively: a block dominates itself)?
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&dom) = self.idom.get(&cur) {
            if dom == cur {
                return false;
            }
            if dom == a {
                return true;
            }
            cur = dom;
        }
        false
    }

    /// Is `block` reachable (was it assigned an immediate dominator)?
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.contains_key(&block)
    }
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo_number: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_number[&a] > rpo_number[&b] {
            a = idom[&a];
        }
        while rpo_number[&b] > rpo_number[&a] {
            b = idom[&b];
        }
    }
    a
}
