//! Error kinds surfaced across the pass boundary.
//!
//! No pass in this crate panics on a recoverable condition or throws across an FFI-like
//! boundary: every fallible entry point returns a [`CoreResult`]. A [`CoreError`] is
//! produced either by the [`crate::ir::graph_checker::GraphChecker`] finding a structural
//! invariant violation (fatal in debug builds), by a pass giving up within its iteration
//! budget (non-fatal; the pipeline continues without that pass's effect), by a
//! [`crate::runtime::Runtime`] query failing, or by the graph asking for an opcode or data
//! type this target doesn't support.

use crate::ir::InstId;

/// The kind of failure a pass or the graph checker reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The graph checker found a violation of SSA, dominance, or the save-state contract.
    ///
    /// Fatal in debug builds; the embedder should treat this as an abort of the
    /// compilation unit, not a condition to recover from.
    #[error("structural invariant violated in {pass}: {detail}")]
    StructuralInvariant {
        /// Name of the pass that left the graph in this state.
        pass: &'static str,
        /// Human-readable description of the violation.
        detail: String,
    },

    /// A pass could not complete within its iteration budget.
    ///
    /// Non-fatal: the pass returns `false`/unwinds its partial work and the pipeline
    /// continues; the embedder may choose to skip this compile or fall back to an
    /// unoptimized path.
    #[error("pass {pass} could not complete: {detail}")]
    PassCannotComplete {
        /// Name of the pass that gave up.
        pass: &'static str,
        /// Human-readable description of why.
        detail: String,
    },

    /// A [`crate::runtime::Runtime`] query returned an error.
    #[error("runtime lookup failed for {entity:?} in {pass}: {detail}")]
    RuntimeLookupFailure {
        /// Name of the pass that issued the query.
        pass: &'static str,
        /// The instruction whose runtime query failed, if any.
        entity: Option<InstId>,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// The graph requests an opcode or data type this target does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CoreError {
    /// Build a [`CoreError::StructuralInvariant`] with a formatted detail message.
    pub fn structural(pass: &'static str, detail: impl Into<String>) -> Self {
        CoreError::StructuralInvariant {
            pass,
            detail: detail.into(),
        }
    }

    /// Build a [`CoreError::PassCannotComplete`] with a formatted detail message.
    pub fn cannot_complete(pass: &'static str, detail: impl Into<String>) -> Self {
        CoreError::PassCannotComplete {
            pass,
            detail: detail.into(),
        }
    }

    /// Build a [`CoreError::RuntimeLookupFailure`].
    pub fn runtime_lookup(pass: &'static str, entity: Option<InstId>, detail: impl Into<String>) -> Self {
        CoreError::RuntimeLookupFailure {
            pass,
            entity,
            detail: detail.into(),
        }
    }
}

/// The result type returned by every fallible pass entry point in this crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Format a method name and failing pass name the way an unrecoverable structural error is
/// reported to the embedder, per the error handling design's "structured message".
pub fn format_fatal(method_name: &str, pass: &'static str, detail: &str) -> String {
    format!("{}: pass `{}` aborted: {}", method_name, pass, detail)
}
