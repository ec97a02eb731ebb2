//! Reverse post-order traversal of the control flow graph.

use crate::ir::{BlockId, Graph};

/// Compute the reverse post-order of blocks reachable from `graph`'s start block.
///
/// Every other traversal-dependent analysis (dominators, loops, the liveness linear order)
/// is defined in terms of this order, so it is computed once per `Graph::rpo()` call and
/// cached until a CFG-mutating pass invalidates it.
pub fn compute_rpo(graph: &Graph) -> Vec<BlockId> {
    let start = graph.start_block();
    let mut visited = std::collections::HashSet::new();
    let mut post_order = Vec::with_capacity(graph.block_len());
    let mut stack: Vec<(BlockId, usize)> = vec![(start, 0)];
    visited.insert(start);

    while let Some(&mut (block, ref mut next_succ)) = stack.last_mut() {
        let succs = graph.block(block).succs();
        if *next_succ < succs.len() {
            let succ = succs[*next_succ];
            *next_succ += 1;
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            post_order.push(block);
            stack.pop();
        }
    }

    post_order.reverse();
    post_order
}
