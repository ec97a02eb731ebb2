//! Memory coalescing: fuses adjacent array loads/stores on consecutive indices into a single
//! pair memory op, subject to aliasing, element-type, and movement-range constraints.
//!
//! AArch64 is this pass's reference target (its pair load/store instructions are the whole
//! reason to run it); [`crate::options::Architecture::BytecodeVirtual`] has no pair
//! instructions and this pass is simply skipped for it.

pub mod movement_range;
pub mod pair_collector;
pub mod replace;
pub mod variable_analysis;

use crate::error::CoreResult;
use crate::ir::Graph;
use crate::options::Architecture;

/// Summary of what one run of memory coalescing changed.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoalescingStats {
    /// Pairs fused into a single pair memory op.
    pub pairs_fused: usize,
}

/// Run memory coalescing over `graph`. A no-op (returning default stats) on an architecture
/// without pair instructions.
pub fn run(graph: &mut Graph, allow_references: bool) -> CoreResult<CoalescingStats> {
    let _t = crate::timing::memory_coalescing();
    let mut stats = CoalescingStats::default();
    if graph.architecture() != Architecture::Aarch64 {
        return Ok(stats);
    }

    let variables = variable_analysis::analyze(graph);
    let blocks: Vec<_> = graph.block_ids().collect();
    for block in blocks {
        let candidates = pair_collector::collect(graph, block, &variables, allow_references);
        for pair in candidates {
            let insertion_point = movement_range::insertion_point(graph, block, &pair);
            replace::apply(graph, &pair, insertion_point);
            stats.pairs_fused += 1;
        }
    }

    graph.invalidate_analyses();
    Ok(stats)
}
