//! Scoped marker bits for `O(1)` "have I visited this instruction already" checks.
//!
//! Several passes (materialization's transitive closure, loop re-iteration, the graph
//! checker's reachability walk) need a disposable "visited" bit per instruction without
//! paying for a fresh `HashSet` every time. [`Graph`](crate::ir::Graph) owns a pool of
//! marker bits; acquiring a [`MarkerScope`] reserves one, and its `Drop` impl releases it
//! so markers can't leak across passes. Nesting two scopes from the same pool is a misuse
//! (the reservation would be indistinguishable between scopes), so `MarkerScope` asserts
//! against it rather than silently reusing a bit.

use crate::ir::InstId;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared pool of marker bits, indexed by `(instruction, marker bit index)`.
#[derive(Default)]
pub struct MarkerPool {
    /// `in_use[i]` is `true` while some `MarkerScope` holds bit `i`.
    in_use: RefCell<Vec<bool>>,
    /// `bits[i]` is the set of instructions currently marked with bit `i`.
    bits: RefCell<Vec<std::collections::HashSet<InstId>>>,
}

impl MarkerPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve(&self) -> usize {
        let mut in_use = self.in_use.borrow_mut();
        if let Some(i) = in_use.iter().position(|&b| !b) {
            in_use[i] = true;
            i
        } else {
            in_use.push(true);
            let mut bits = self.bits.borrow_mut();
            bits.push(std::collections::HashSet::new());
            in_use.len() - 1
        }
    }

    fn release(&self, idx: usize) {
        self.bits.borrow_mut()[idx].clear();
        self.in_use.borrow_mut()[idx] = false;
    }
}

/// An RAII handle on one marker bit, reserved for the lifetime of a single pass.
///
/// Acquiring a scope reserves a bit on the graph's [`MarkerPool`]; dropping it clears and
/// releases that bit, so the next pass to request a scope starts from a clean slate
/// regardless of how this one exited (normal return, early `?`, or panic).
pub struct MarkerScope {
    pool: Rc<MarkerPool>,
    idx: usize,
}

impl MarkerScope {
    /// Reserve a fresh marker bit on `pool`.
    pub fn acquire(pool: Rc<MarkerPool>) -> Self {
        let idx = pool.reserve();
        Self { pool, idx }
    }

    /// Mark `inst`. Returns `true` if `inst` was not already marked.
    pub fn mark(&self, inst: InstId) -> bool {
        self.pool.bits.borrow_mut()[self.idx].insert(inst)
    }

    /// Check whether `inst` is marked.
    pub fn is_marked(&self, inst: InstId) -> bool {
        self.pool.bits.borrow()[self.idx].contains(&inst)
    }

    /// Unmark `inst`.
    pub fn unmark(&self, inst: InstId) {
        self.pool.bits.borrow_mut()[self.idx].remove(&inst);
    }
}

impl Drop for MarkerScope {
    fn drop(&mut self) {
        self.pool.release(self.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_entity::EntityRef;

    #[test]
    fn scopes_are_independent_and_released() {
        let pool = Rc::new(MarkerPool::new());
        let a = InstId::new(0);
        let b = InstId::new(1);
        {
            let s1 = MarkerScope::acquire(pool.clone());
            let s2 = MarkerScope::acquire(pool.clone());
            assert!(s1.mark(a));
            assert!(!s1.is_marked(b));
            assert!(s2.mark(b));
            assert!(!s2.is_marked(a));
        }
        // Both scopes released; a fresh one must not see stale marks.
        let s3 = MarkerScope::acquire(pool);
        assert!(!s3.is_marked(a));
        assert!(!s3.is_marked(b));
    }
}
