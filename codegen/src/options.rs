//! Optimization flags, modeled as a typed `Flags`/`Builder` pair (mirrors the teacher's
//! `settings::Flags` rather than threading loose booleans through every pass entry point).

/// Target architecture the pipeline is compiling for.
///
/// Memory coalescing's pair instructions and the register allocator's physical register
/// banks are both architecture-specific; everything else in this crate is
/// architecture-agnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    /// AArch64: the reference design for memory coalescing's pair load/store instructions.
    Aarch64,
    /// A single virtual register bank with no pair instructions, used by the
    /// bytecode-optimizer mode.
    BytecodeVirtual,
}

/// Compilation mode, mirroring the `Graph`'s mode flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileMode {
    /// Optimizing bytecode in place, target is a single virtual register bank.
    BytecodeOptimizer,
    /// JIT compilation with a full architecture register bank and stack-slot overflow.
    Jit,
    /// On-stack-replacement compilation.
    Osr,
    /// Compiling a dynamically-typed method.
    Dynamic,
}

/// Resolved set of optimization flags for one compilation unit.
#[derive(Clone, Debug)]
pub struct Flags {
    /// `compiler_scalar_replacement`: enables PEA/SR.
    pub scalar_replacement: bool,
    /// `compiler_memory_coalescing`: enables coalescing.
    pub memory_coalescing: bool,
    /// `compiler_memory_coalescing_objects`: allow reference coalescing.
    pub memory_coalescing_objects: bool,
    /// `compiler_use_safepoint`: require a safepoint in every non-try loop (checker only).
    pub use_safepoint: bool,
    /// `compiler_support_init_object_inst`: accepts the `InitObject` opcode.
    pub support_init_object_inst: bool,
    /// `compiler_inline_full_intrinsics`: relaxes an object-type check for dynamic methods.
    pub inline_full_intrinsics: bool,
    /// Target architecture.
    pub architecture: Architecture,
    /// Compilation mode.
    pub mode: CompileMode,
    /// Maximum natural-loop nesting depth escape analysis will iterate before giving up
    /// (`PassCannotComplete`). See  4.2 / 7.
    pub max_loop_nesting_depth: u32,
    /// Maximum number of spill/split rounds the register allocator will attempt before
    /// aborting allocation.
    pub max_spill_rounds: u32,
    /// Run the [`crate::ir::graph_checker::GraphChecker`] after every pass.
    pub enable_verifier: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Builder::new().finish()
    }
}

/// Builder for [`Flags`], mirroring the teacher's `settings::Builder`.
#[derive(Clone, Debug)]
pub struct Builder {
    flags: Flags,
}

impl Builder {
    /// Start from the conservative defaults: every optimization enabled, JIT mode,
    /// AArch64 architecture, generous but bounded iteration budgets, verifier on.
    pub fn new() -> Self {
        Self {
            flags: Flags {
                scalar_replacement: true,
                memory_coalescing: true,
                memory_coalescing_objects: false,
                use_safepoint: true,
                support_init_object_inst: false,
                inline_full_intrinsics: false,
                architecture: Architecture::Aarch64,
                mode: CompileMode::Jit,
                max_loop_nesting_depth: 5,
                max_spill_rounds: 30,
                enable_verifier: cfg!(debug_assertions),
            },
        }
    }

    /// Enable or disable partial escape analysis and scalar replacement.
    pub fn scalar_replacement(mut self, enabled: bool) -> Self {
        self.flags.scalar_replacement = enabled;
        self
    }

    /// Enable or disable memory coalescing.
    pub fn memory_coalescing(mut self, enabled: bool) -> Self {
        self.flags.memory_coalescing = enabled;
        self
    }

    /// Allow memory coalescing to pair up reference-typed loads/stores.
    pub fn memory_coalescing_objects(mut self, enabled: bool) -> Self {
        self.flags.memory_coalescing_objects = enabled;
        self
    }

    /// Require a safepoint in every non-try loop (checked by the graph checker only).
    pub fn use_safepoint(mut self, enabled: bool) -> Self {
        self.flags.use_safepoint = enabled;
        self
    }

    /// Accept the `InitObject` opcode.
    pub fn support_init_object_inst(mut self, enabled: bool) -> Self {
        self.flags.support_init_object_inst = enabled;
        self
    }

    /// Relax an object-type check for dynamic methods with fully-inlined intrinsics.
    pub fn inline_full_intrinsics(mut self, enabled: bool) -> Self {
        self.flags.inline_full_intrinsics = enabled;
        self
    }

    /// Select the target architecture.
    pub fn architecture(mut self, arch: Architecture) -> Self {
        self.flags.architecture = arch;
        self
    }

    /// Select the compilation mode.
    pub fn mode(mut self, mode: CompileMode) -> Self {
        self.flags.mode = mode;
        self
    }

    /// Cap how many nested loop levels escape analysis will iterate before reporting
    /// `PassCannotComplete`.
    pub fn max_loop_nesting_depth(mut self, depth: u32) -> Self {
        self.flags.max_loop_nesting_depth = depth;
        self
    }

    /// Cap how many spill/split rounds the register allocator will attempt.
    pub fn max_spill_rounds(mut self, rounds: u32) -> Self {
        self.flags.max_spill_rounds = rounds;
        self
    }

    /// Enable or disable the graph checker between passes.
    pub fn enable_verifier(mut self, enabled: bool) -> Self {
        self.flags.enable_verifier = enabled;
        self
    }

    /// Freeze the builder into a [`Flags`] value.
    pub fn finish(self) -> Flags {
        self.flags
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
