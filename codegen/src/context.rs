//! `PipelineContext`: owns a [`Graph`] and drives the optimization pipeline over it.
//!
//! Mirrors the teacher's `context::Context`, which owns a `Function` plus shared analysis
//! caches and threads them through a fixed pass sequence, verifying in between when asked.
//! This crate's graph already carries its own lazily-computed `DominatorTree`/`LoopTree`
//! (see [`Graph::dominator_tree`]/[`Graph::loop_tree`]), so `PipelineContext` itself only
//! needs to own the graph and sequence the passes; there is no separate cache to thread.

use crate::error::CoreResult;
use crate::ir::{Graph, GraphChecker};
use crate::options::Flags;
use crate::runtime::Runtime;
use crate::{coalescing, regalloc, scalar_replacement};

/// Per-pass statistics collected by one [`PipelineContext::run_optimizations`] call, for
/// callers that want to log or assert on what actually ran.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    /// Set if scalar replacement ran (`Flags::scalar_replacement`).
    pub scalar_replacement: Option<scalar_replacement::ScalarReplacementStats>,
    /// Set if memory coalescing ran (`Flags::memory_coalescing`).
    pub coalescing: Option<coalescing::CoalescingStats>,
}

/// Owns the [`Graph`] being compiled and runs the optimization pipeline over it.
pub struct PipelineContext {
    graph: Graph,
}

impl PipelineContext {
    /// Wrap an already-built graph.
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// The graph under compilation.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access, for passes or test fixtures that build the graph directly.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Unwrap the context, handing the finished graph back to the caller (e.g. for binemit).
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Run Partial Escape Analysis + Scalar Replacement, Memory Coalescing, and the graph
    /// coloring register allocator in sequence, each gated by its `Flags` bit, verifying the
    /// graph in between when `flags.enable_verifier` is set.
    ///
    /// `flags` and `runtime` are taken explicitly (rather than read back off `self.graph`) so
    /// an embedder can re-run the pipeline under a different flag set without rebuilding the
    /// graph, mirroring the teacher's `Context::run_passes(&self, flags: &Flags, ...)`.
    pub fn run_optimizations(&mut self, flags: &Flags, runtime: &dyn Runtime) -> CoreResult<PipelineStats> {
        let _ = runtime;
        let mut stats = PipelineStats::default();

        if flags.scalar_replacement {
            let sr = scalar_replacement::run(&mut self.graph)?;
            stats.scalar_replacement = Some(sr);
            self.verify_if_requested(flags, "scalar_replacement")?;
        }

        if flags.memory_coalescing {
            let cs = coalescing::run(&mut self.graph, flags.memory_coalescing_objects)?;
            stats.coalescing = Some(cs);
            self.verify_if_requested(flags, "memory_coalescing")?;
        }

        regalloc::allocate_registers(&mut self.graph)?;
        self.verify_if_requested(flags, "regalloc")?;

        Ok(stats)
    }

    fn verify_if_requested(&mut self, flags: &Flags, pass: &'static str) -> CoreResult<()> {
        if flags.enable_verifier {
            GraphChecker::verify(&mut self.graph, pass)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, InstData, Opcode};
    use crate::options::Builder;
    use crate::runtime::FakeRuntime;

    fn leaf_graph(flags: Flags) -> Graph {
        let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);
        let entry = graph.create_block();
        graph.set_start_block(entry);
        graph.set_end_block(entry);
        let zero = graph.make_inst(Opcode::Constant, crate::ir::DataType::I32);
        graph.inst_mut(zero).set_data(InstData::Constant(crate::ir::ConstantValue::Int(0)));
        graph.append_inst(entry, zero);
        let ret = graph.make_inst(Opcode::Return, crate::ir::DataType::Void);
        graph.append_input(ret, zero, crate::ir::DataType::I32);
        graph.append_inst(entry, ret);
        graph
    }

    #[test]
    fn pipeline_runs_clean_on_a_trivial_leaf_method() {
        let flags = Builder::new().enable_verifier(true).finish();
        let graph = leaf_graph(flags.clone());
        let mut ctx = PipelineContext::new(graph);
        let runtime = FakeRuntime::default();
        let stats = ctx.run_optimizations(&flags, &runtime).expect("pipeline should succeed");
        assert!(stats.scalar_replacement.is_some());
        assert_eq!(ctx.graph().block_ids().count(), 1);
        let _ = BlockId::new(0);
    }

    #[test]
    fn disabled_passes_leave_no_stats() {
        let flags = Builder::new()
            .scalar_replacement(false)
            .memory_coalescing(false)
            .finish();
        let graph = leaf_graph(flags.clone());
        let mut ctx = PipelineContext::new(graph);
        let runtime = FakeRuntime::default();
        let stats = ctx.run_optimizations(&flags, &runtime).expect("pipeline should succeed");
        assert!(stats.scalar_replacement.is_none());
        assert!(stats.coalescing.is_none());
    }
}
