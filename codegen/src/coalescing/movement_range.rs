//! Movement range resolution: where a fused pair instruction may legally replace its two
//! originals.
//!
//! `first`'s inputs (base, index) are already defined before `first` itself, so the only real
//! lower bound is `first`'s own position. The upper bound is the earliest instruction in the
//! block that consumes `first`'s or `second`'s result -- the fused pair's projections aren't
//! defined until the insertion point, so nothing that reads the original value can sit before
//! it. [`crate::coalescing::pair_collector`] already guarantees no store, deopt, barrier, or
//! other non-pure instruction sits between `first` and `second`, so the only thing left to
//! bound against is a genuine data consumer.

use crate::coalescing::pair_collector::PairCandidate;
use crate::ir::{BlockId, Graph, InstId};
use std::collections::HashSet;

/// The instruction `pair`'s fused replacement should be inserted immediately before, within
/// `block`.
pub fn insertion_point(graph: &Graph, block: BlockId, pair: &PairCandidate) -> InstId {
    let insts = graph.block(block).insts();
    let first_pos = insts
        .iter()
        .position(|&i| i == pair.first)
        .expect("pair candidate's first access is in its own block");
    let second_pos = insts
        .iter()
        .position(|&i| i == pair.second)
        .expect("pair candidate's second access is in its own block");

    let first_users: HashSet<InstId> = graph.inst(pair.first).users().iter().map(|u| u.user).collect();
    let second_users: HashSet<InstId> = graph.inst(pair.second).users().iter().map(|u| u.user).collect();

    for (idx, &inst) in insts.iter().enumerate().skip(first_pos + 1) {
        if idx == second_pos {
            return inst;
        }
        if first_users.contains(&inst) || (idx > second_pos && second_users.contains(&inst)) {
            return inst;
        }
    }
    // Every block ends in a terminator, so `second_pos` is always reached above; this is
    // unreachable in practice.
    pair.second
}
