//! Basic pass timing.
//!
//! Mirrors the teacher's `timing` module: each pass wraps its body in a named guard whose
//! `Drop` impl records elapsed time through the `log` facade at `trace` level. There is no
//! bundled reporting sink; an embedder that wants aggregate numbers installs a `log`
//! subscriber and scrapes these records the same way it would for any other pass tracing.

use core::time::Duration;
use std::time::Instant;

/// An RAII guard that logs how long the pass it names took to run.
pub struct PassTimer {
    name: &'static str,
    start: Instant,
}

impl PassTimer {
    fn new(name: &'static str) -> Self {
        log::trace!("timing: entering {}", name);
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        log::trace!("timing: {} took {:?}", self.name, self.elapsed());
    }
}

macro_rules! pass_timer {
    ($name:ident) => {
        /// Start timing the
        #[doc = stringify!($name)]
        /// pass.
        pub fn $name() -> PassTimer {
            PassTimer::new(stringify!($name))
        }
    };
}

pass_timer!(escape_analysis);
pass_timer!(scalar_replacement);
pass_timer!(memory_coalescing);
pass_timer!(regalloc);
pass_timer!(liveness);
pass_timer!(dominator_tree);
pass_timer!(loop_analysis);
pass_timer!(graph_checker);
