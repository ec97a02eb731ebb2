//! `SaveState`: captured interpreter state at a safepoint, call, allocation, or deopt exit.

use crate::ir::InstId;
use ark_entity::EntitySet;
use smallvec::SmallVec;

/// One live value captured by a `SaveState`, tagged with the virtual register (interpreter
/// accumulator/local slot) the deoptimizer should restore it into.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SaveStateEntry {
    /// The captured value.
    pub value: InstId,
    /// Interpreter virtual register this value must be written back to on deopt.
    pub virtual_register: u16,
}

/// The payload of a `SaveState`/`SafePoint`/`SaveStateDeoptimize` instruction.
///
/// Scalar replacement rewrites these in place ( 4.3 step 6): when an input previously
/// pointed at a virtualized object it is replaced by references to the object's
/// materialized fields (or dropped if the object never escapes), and the corresponding bit
/// in `virtualized` is set so the deoptimizer knows to reconstruct the object instead of
/// reading it directly.
#[derive(Clone, Debug, Default)]
pub struct SaveStateInst {
    entries: SmallVec<[SaveStateEntry; 8]>,
    /// Bit set, indexed by position in `entries`: set when that entry's original value was a
    /// virtualized object that scalar replacement decomposed into its fields.
    virtualized: EntitySet<InstId>,
    /// The enclosing call's `CallInlined`, when this SaveState belongs to an inlined frame;
    /// chains back through nested inlining so `inlining_depth()` can be computed.
    pub caller_call: Option<InstId>,
}

impl SaveStateInst {
    /// An empty SaveState with no caller frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a captured value. Returns the entry's index.
    pub fn push(&mut self, value: InstId, virtual_register: u16) -> usize {
        self.entries.push(SaveStateEntry {
            value,
            virtual_register,
        });
        self.entries.len() - 1
    }

    /// Read-only view of captured entries, in capture order.
    pub fn entries(&self) -> &[SaveStateEntry] {
        &self.entries
    }

    /// Iterate the captured values only.
    pub fn values(&self) -> impl Iterator<Item = InstId> + '_ {
        self.entries.iter().map(|e| e.value)
    }

    /// Replace the value captured at `index`, keeping its virtual register slot.
    pub fn replace_at(&mut self, index: usize, new_value: InstId) {
        self.entries[index].value = new_value;
    }

    /// Remove the entry at `index` (used when a virtualized input that never escapes is
    /// dropped from the SaveState entirely rather than decomposed).
    pub fn remove_at(&mut self, index: usize) {
        self.entries.remove(index);
    }

    /// Mark the entry originally at `value` as standing in for a decomposed virtual object.
    pub fn mark_virtualized(&mut self, value: InstId) {
        self.virtualized.insert(value);
    }

    /// Was the entry originally pointing at `value` a decomposed virtual object?
    pub fn is_virtualized(&self, value: InstId) -> bool {
        self.virtualized.contains(value)
    }

    /// Nesting depth of the inlined call this SaveState belongs to (0 = not inlined).
    pub fn inlining_depth(&self, graph: &crate::ir::Graph) -> u32 {
        let mut depth = 0;
        let mut cur = self.caller_call;
        while let Some(call) = cur {
            depth += 1;
            cur = graph
                .inst(call)
                .save_state()
                .and_then(|ss| graph.save_state_of(ss))
                .and_then(|ss| ss.caller_call);
        }
        depth
    }
}
