//! Partial escape analysis: decides which allocations can be kept off the heap entirely
//! and, for those that can't, where they must be rebuilt.

pub mod analysis;
pub mod decompose;
pub mod materialize_planner;
pub mod state;

pub use analysis::{analyze, PeaResult};
pub use decompose::{compose, decompose, DecomposedGuard};
pub use materialize_planner::{build_plans, MaterializationPlan, PlannedField};
pub use state::{ArrayIndex, Field, PhiState, PhiStateId, StateOwner, VirtualState};
