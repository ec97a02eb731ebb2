//! Core optimizer for a Panda/ArkCompiler-style bytecode compiler.
//!
//! This crate owns the SSA sea-of-nodes IR (`ir`) and the three tightly coupled
//! optimizations that run over it:
//!
//! - partial escape analysis and scalar replacement (`pea`, `scalar_replacement`),
//! - memory coalescing of adjacent array loads/stores (`coalescing`),
//! - a graph-coloring register allocator (`regalloc`).
//!
//! The frontend that lowers bytecode into this IR, the backend emitter, and the
//! class-linker/GC runtime are all external collaborators reached through the
//! [`runtime::Runtime`] capability; none of their internals live in this crate.
#![deny(missing_docs, unused_extern_crates)]
#![warn(unused_import_braces)]

pub use ark_entity as entity;

pub mod analysis;
pub mod coalescing;
pub mod context;
pub mod cursor;
pub mod error;
pub mod ir;
pub mod isa;
pub mod marker;
pub mod options;
pub mod pea;
pub mod regalloc;
pub mod runtime;
pub mod scalar_replacement;
pub mod timing;

pub use crate::context::PipelineContext;
pub use crate::error::{CoreError, CoreResult};
pub use crate::options::Flags;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
