//! The sea-of-nodes SSA IR this crate's passes read and rewrite.

pub mod basic_block;
pub mod builder;
pub mod entities;
pub mod graph;
pub mod graph_checker;
pub mod inst;
pub mod opcode;
pub mod rpo;
pub mod save_state;
pub mod types;

pub use basic_block::{BasicBlock, BlockFlags};
pub use builder::GraphBuilder;
pub use entities::{BlockId, InstId, StateId, MATERIALIZED_ID};
pub use graph::Graph;
pub use graph_checker::GraphChecker;
pub use inst::{ConstantValue, FieldRef, Input, Inst, InstData, InstFlags, UserEdge};
pub use opcode::{CompareCond, Opcode};
pub use save_state::{SaveStateEntry, SaveStateInst};
pub use types::DataType;
