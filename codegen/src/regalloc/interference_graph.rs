//! Interference graph built from life intervals, plus affinity (bias) edges and call-clobber
//! bookkeeping for the coloring pass.

use crate::analysis::liveness::{LifeInterval, Position};
use crate::ir::InstId;
use crate::isa::PhysicalRegister;
use std::collections::{HashMap, HashSet};

/// One DFS-grouped affinity component: every node [`InterferenceGraph::compute_bias_components`]
/// joined together along affinity edges, plus the color the first member to get colored
/// picked, so every later member in the same component inherits it instead of re-deciding.
#[derive(Clone, Debug, Default)]
pub struct BiasComponent {
    /// Every node belonging to this component.
    pub members: Vec<InstId>,
    /// The color the component settled on, once its first member is colored.
    pub color: Option<PhysicalRegister>,
}

/// One node in the interference graph: a value's life interval plus its interference edges,
/// its affinity-component membership, any fixed color it's pinned to, and the two numbers
/// the coloring/spill passes need to make a decision: how many calls its interval crosses,
/// and its spill weight.
#[derive(Clone, Debug)]
pub struct ColorNode {
    /// The value this node represents.
    pub value: InstId,
    /// Values whose intervals overlap this one's (cannot share a color).
    pub interferes_with: HashSet<InstId>,
    /// Index into the owning graph's bias-component list, once
    /// [`InterferenceGraph::compute_bias_components`] has run.
    pub bias: Option<usize>,
    /// A register this node must receive rather than have the coloring pass choose one --
    /// a physical or preassigned-register interval ( 4.5's precoloring step).
    pub fixed: Option<PhysicalRegister>,
    /// Count of calls this node's interval is live across, recorded while building the
    /// graph; a nonzero count biases coloring toward a callee-saved register, since a
    /// caller-saved one would be clobbered at every crossed call regardless.
    pub callsite_intersections: u32,
    /// Cached spill weight ( 4.5's formula), filled in by
    /// [`InterferenceGraph::set_spill_weights`]; the spill loop evicts the lowest-weight
    /// uncolorable node first.
    pub spill_weight: f64,
}

/// The full interference graph for one compilation unit's register allocation: a dense node
/// table, the interference edges embedded per-node, and a separate affinity-edge table used
/// to compute [`BiasComponent`]s.
#[derive(Default)]
pub struct InterferenceGraph {
    nodes: HashMap<InstId, ColorNode>,
    affinity: HashMap<InstId, Vec<(InstId, u32)>>,
    bias_components: Vec<BiasComponent>,
}

impl InterferenceGraph {
    /// Build the graph by pairwise-overlap-testing every interval (quadratic in the number
    /// of live values; acceptable at the method granularity this crate operates at). No call
    /// crossings are recorded; use [`Self::build_with_callsites`] when callee-saved biasing
    /// matters.
    pub fn build<'a>(intervals: impl Iterator<Item = &'a LifeInterval>) -> Self {
        Self::build_with_callsites(intervals, &[])
    }

    /// Build the graph exactly as [`Self::build`] does, additionally recording, per node, how
    /// many of `call_positions` fall within that value's live ranges ( 4.5: "record one
    /// callsite intersection per crossed physical range").
    pub fn build_with_callsites<'a>(
        intervals: impl Iterator<Item = &'a LifeInterval>,
        call_positions: &[Position],
    ) -> Self {
        let values: Vec<&LifeInterval> = intervals.collect();
        let mut nodes: HashMap<InstId, ColorNode> = HashMap::new();
        for iv in &values {
            let crossings = call_positions.iter().filter(|&&pos| iv.covers(pos)).count() as u32;
            nodes.insert(
                iv.value(),
                ColorNode {
                    value: iv.value(),
                    interferes_with: HashSet::new(),
                    bias: None,
                    fixed: None,
                    callsite_intersections: crossings,
                    spill_weight: 0.0,
                },
            );
        }
        for i in 0..values.len() {
            for j in (i + 1)..values.len() {
                if values[i].overlaps(values[j]) {
                    let a = values[i].value();
                    let b = values[j].value();
                    nodes.get_mut(&a).unwrap().interferes_with.insert(b);
                    nodes.get_mut(&b).unwrap().interferes_with.insert(a);
                }
            }
        }
        Self {
            nodes,
            affinity: HashMap::new(),
            bias_components: Vec::new(),
        }
    }

    /// Add a brand-new node (a spill-split sibling minted after the graph was built) and wire
    /// its interference edges against every interval in `universe` that is already a node of
    /// this graph. `interval.value()` becomes the new node's key; callers must have already
    /// retargeted it onto a fresh identity distinct from every other live node.
    pub fn insert_interval<'a>(&mut self, interval: &LifeInterval, universe: impl Iterator<Item = &'a LifeInterval>) {
        let value = interval.value();
        let mut interferes = HashSet::new();
        for other in universe {
            if other.value() != value && self.nodes.contains_key(&other.value()) && interval.overlaps(other) {
                interferes.insert(other.value());
            }
        }
        for &other in &interferes {
            self.nodes.get_mut(&other).unwrap().interferes_with.insert(value);
        }
        self.nodes.insert(
            value,
            ColorNode {
                value,
                interferes_with: interferes,
                bias: None,
                fixed: None,
                callsite_intersections: 0,
                spill_weight: 0.0,
            },
        );
    }

    /// Record an affinity edge between two values that are not known to interfere; does not
    /// itself group them into a [`BiasComponent`] -- call [`Self::compute_bias_components`]
    /// once every affinity edge has been added.
    pub fn add_bias(&mut self, a: InstId, b: InstId, weight: u32) {
        if self.nodes.contains_key(&a) && self.nodes.contains_key(&b) {
            self.affinity.entry(a).or_default().push((b, weight));
            self.affinity.entry(b).or_default().push((a, weight));
        }
    }

    /// Pin `value` to a specific physical register rather than letting the coloring pass
    /// choose one ( 4.5's "physical intervals and preassigned-register intervals have a fixed
    /// color").
    pub fn set_fixed(&mut self, value: InstId, reg: PhysicalRegister) {
        if let Some(node) = self.nodes.get_mut(&value) {
            node.fixed = Some(reg);
        }
    }

    /// Fill in every node's cached spill weight from a precomputed `value -> weight` table.
    pub fn set_spill_weights(&mut self, weights: &HashMap<InstId, f64>) {
        for (value, node) in self.nodes.iter_mut() {
            if let Some(&w) = weights.get(value) {
                node.spill_weight = w;
            }
        }
    }

    /// Group every node into an affinity component by DFS over the affinity edges added via
    /// [`Self::add_bias`]: a node joins the current component through an affinity edge only if
    /// no interference edge connects it to a node already in that component ( 4.5: "provided
    /// no interference edge connects them to an already-biased node of the same component").
    /// A node an interference edge blocks from joining starts (or joins) a component of its
    /// own instead, from a still-unvisited affinity neighbor.
    pub fn compute_bias_components(&mut self) {
        let mut assigned: HashMap<InstId, usize> = HashMap::new();
        let mut components: Vec<BiasComponent> = Vec::new();
        let mut all_values: Vec<InstId> = self.nodes.keys().copied().collect();
        all_values.sort();

        for start in all_values {
            if assigned.contains_key(&start) {
                continue;
            }
            let comp_idx = components.len();
            let mut members: Vec<InstId> = Vec::new();
            let mut stack = vec![start];
            let mut seen_this_walk: HashSet<InstId> = HashSet::new();
            while let Some(v) = stack.pop() {
                if assigned.contains_key(&v) || !seen_this_walk.insert(v) {
                    continue;
                }
                let blocked = self
                    .nodes
                    .get(&v)
                    .map(|node| members.iter().any(|m| node.interferes_with.contains(m)))
                    .unwrap_or(false);
                if blocked {
                    continue;
                }
                assigned.insert(v, comp_idx);
                members.push(v);
                if let Some(neighbors) = self.affinity.get(&v) {
                    for &(w, _weight) in neighbors {
                        if !assigned.contains_key(&w) {
                            stack.push(w);
                        }
                    }
                }
            }
            if members.len() > 1 {
                for &m in &members {
                    self.nodes.get_mut(&m).unwrap().bias = Some(comp_idx);
                }
                components.push(BiasComponent { members, color: None });
            }
            // A component of size one carries no preference; leave its `bias` unset so the
            // coloring pass falls straight through to plain first-fit.
        }
        self.bias_components = components;
    }

    /// Read a bias component by index.
    pub fn bias_component(&self, idx: usize) -> &BiasComponent {
        &self.bias_components[idx]
    }

    /// Record the color a bias component settled on, so later-colored members of the same
    /// component inherit it.
    pub fn set_bias_component_color(&mut self, idx: usize, color: PhysicalRegister) {
        self.bias_components[idx].color = Some(color);
    }

    /// Read a node.
    pub fn node(&self, value: InstId) -> Option<&ColorNode> {
        self.nodes.get(&value)
    }

    /// Remove a node entirely (used by the spill loop to drop a spilled value from the
    /// interference graph before recoloring).
    pub fn remove(&mut self, value: InstId) {
        if let Some(node) = self.nodes.remove(&value) {
            for other in node.interferes_with {
                if let Some(n) = self.nodes.get_mut(&other) {
                    n.interferes_with.remove(&value);
                }
            }
        }
        self.affinity.remove(&value);
        for neighbors in self.affinity.values_mut() {
            neighbors.retain(|&(other, _)| other != value);
        }
    }

    /// All node values.
    pub fn values(&self) -> impl Iterator<Item = InstId> + '_ {
        self.nodes.keys().copied()
    }

    /// Degree (interference count) of a node.
    pub fn degree(&self, value: InstId) -> usize {
        self.nodes.get(&value).map(|n| n.interferes_with.len()).unwrap_or(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Is the graph empty?
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
