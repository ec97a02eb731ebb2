//! Per-value life intervals, the register allocator's core data structure.

use crate::analysis::liveness::linear_order::Position;
use crate::ir::InstId;
use smallvec::SmallVec;

/// One use of a value within its life interval.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UsePosition {
    /// Linear position of the consuming instruction.
    pub pos: Position,
    /// The consuming instruction.
    pub user: InstId,
    /// Whether this use requires the value to be in a physical register rather than
    /// tolerating a stack slot (e.g. it's an arithmetic operand on an architecture with no
    /// memory operand form, vs. a plain SaveState capture which can read from the stack).
    pub register_required: bool,
}

/// A contiguous (possibly gapped, if split) range over which a value is live, plus its use
/// positions within that range.
///
/// `[start, end)` ranges are kept sorted and non-overlapping; the interval as a whole may be
/// split across several ranges once the register allocator's spill pass divides it at a
/// spill point, at which point each split fragment becomes its own `LifeInterval` linked via
/// `parent`.
#[derive(Clone, Debug)]
pub struct LifeInterval {
    value: InstId,
    ranges: SmallVec<[(Position, Position); 2]>,
    uses: SmallVec<[UsePosition; 4]>,
    /// Set once the spill pass divides a too-long interval; points at the original
    /// (unsplit) interval's value id so splits of the same value can be told apart from
    /// distinct values in the interference graph.
    pub parent: Option<InstId>,
    /// Loop nesting depth at the interval's definition point, used by the spill-weight
    /// formula ( 4.5): deeper loops weight spilling more expensive (exponentially) to bias
    /// the allocator toward spilling values defined/used outside hot loops.
    pub loop_depth: u32,
}

impl LifeInterval {
    /// Start a new interval for `value`, defined at `def_pos`.
    pub fn new(value: InstId, def_pos: Position, loop_depth: u32) -> Self {
        Self {
            value,
            ranges: SmallVec::from_slice(&[(def_pos, def_pos)]),
            uses: SmallVec::new(),
            parent: None,
            loop_depth,
        }
    }

    /// The value this interval tracks.
    pub fn value(&self) -> InstId {
        self.value
    }

    /// Extend the interval so it covers `pos` (liveness analysis walks backward from uses to
    /// the definition, widening the live range as it goes).
    pub fn add_range(&mut self, start: Position, end: Position) {
        if let Some(last) = self.ranges.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                last.0 = last.0.min(start);
                return;
            }
        }
        self.ranges.push((start, end));
        self.ranges.sort_by_key(|r| r.0);
    }

    /// Record a use of this value.
    pub fn add_use(&mut self, pos: Position, user: InstId, register_required: bool) {
        self.uses.push(UsePosition {
            pos,
            user,
            register_required,
        });
    }

    /// All ranges, sorted and non-overlapping.
    pub fn ranges(&self) -> &[(Position, Position)] {
        &self.ranges
    }

    /// All recorded uses, in no particular order.
    pub fn uses(&self) -> &[UsePosition] {
        &self.uses
    }

    /// The interval's overall start (first def/extension position).
    pub fn start(&self) -> Position {
        self.ranges.first().map(|r| r.0).unwrap_or(0)
    }

    /// The interval's overall end (last live position).
    pub fn end(&self) -> Position {
        self.ranges.last().map(|r| r.1).unwrap_or(0)
    }

    /// Is `pos` covered by any of this interval's ranges?
    pub fn covers(&self, pos: Position) -> bool {
        self.ranges.iter().any(|&(s, e)| pos >= s && pos < e || pos == s)
    }

    /// Do `self` and `other` overlap at any position? This is the interference-graph edge
    /// test.
    pub fn overlaps(&self, other: &LifeInterval) -> bool {
        for &(s1, e1) in &self.ranges {
            for &(s2, e2) in &other.ranges {
                if s1 < e2 && s2 < e1 {
                    return true;
                }
            }
        }
        false
    }

    /// Produce one narrow sibling interval per use position, each covering just `[pos, pos +
    /// 1)` around that use ( 4.5's spill loop: "split uncolored intervals around their use
    /// positions"). Every sibling still reports `self.value()` as its value; the caller
    /// retargets each one onto a fresh identity via [`Self::retarget`] before adding it back
    /// to the worklist, since two non-overlapping siblings of the same original value must
    /// become distinct interference-graph nodes to be colored independently.
    pub fn split_around_uses(&self) -> Vec<LifeInterval> {
        self.uses
            .iter()
            .map(|u| {
                let mut sib = LifeInterval::new(self.value, u.pos, self.loop_depth);
                sib.add_range(u.pos, u.pos + 1);
                sib.add_use(u.pos, u.user, u.register_required);
                sib
            })
            .collect()
    }

    /// Rekey this interval onto `new_value` (a fresh shadow identity minted for exactly this
    /// purpose) and record `original` as the value it was split from.
    pub fn retarget(mut self, new_value: InstId, original: InstId) -> LifeInterval {
        self.value = new_value;
        self.parent = Some(original);
        self
    }

    /// Spill weight: `sum(uses) * base_cost^loop_depth`, the register allocator's spill-cost
    /// heuristic ( 4.5). A higher weight means spilling this interval is more expensive
    /// (preferred to keep in a register); the spill pass evicts the lowest-weight interval
    /// first.
    pub fn spill_weight(&self, base_cost: f64) -> f64 {
        let use_cost: f64 = self
            .uses
            .iter()
            .map(|u| if u.register_required { 2.0 } else { 1.0 })
            .sum();
        let span = (self.end() - self.start()).max(1) as f64;
        (use_cost + 1.0) * base_cost.powi(self.loop_depth as i32) / span
    }
}
