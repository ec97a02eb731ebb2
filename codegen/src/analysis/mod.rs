//! Graph-level analyses shared by more than one optimization pass.

pub mod alias;
pub mod dominator_tree;
pub mod liveness;
pub mod loop_analysis;

pub use alias::{AliasAnalyzer, AliasResult};
pub use dominator_tree::DominatorTree;
pub use loop_analysis::{Loop, LoopTree};
