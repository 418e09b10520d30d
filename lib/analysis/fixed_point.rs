//! A generic worklist fixed-point engine over a directed graph.
//!
//! The engine is parameterized by an edge direction, so forward analyses
//! (alias tracking over a control-flow graph) and backward analyses
//! (side-effect facts over a call graph) share one worklist loop.
//!
//! The engine trusts the lattice contract: `transfer` and `merge` must be
//! monotonic, or iteration never terminates. It makes no attempt to detect
//! a violation; monotonicity is unit-tested per analysis instance.

use crate::graph::{Edge, Graph, Vertex};
use crate::Error;
use log::trace;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

pub trait FixedPointAnalysis<V: Vertex, State: Clone + Debug + PartialEq> {
    /// Which way flow values travel along edges.
    fn direction(&self) -> Direction;

    /// The flow value for a vertex nothing has reached yet.
    fn initial_state(&self) -> State;

    /// The flow value forced onto entry vertices (exit vertices, for a
    /// backward analysis).
    fn entry_state(&self) -> State;

    /// The effect of one vertex on a flow value.
    fn transfer(&self, vertex: &V, state: &State) -> Result<State, Error>;

    /// Combines flow values arriving over multiple edges.
    fn merge(&self, state0: State, state1: &State) -> Result<State, Error>;
}

/// The least fixed point of an analysis: a `before` and `after` flow value
/// per vertex index, in program order regardless of analysis direction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowResult<State> {
    before: BTreeMap<usize, State>,
    after: BTreeMap<usize, State>,
}

impl<State> FlowResult<State> {
    pub fn before(&self, index: usize) -> Option<&State> {
        self.before.get(&index)
    }

    pub fn after(&self, index: usize) -> Option<&State> {
        self.after.get(&index)
    }

    pub fn before_states(&self) -> &BTreeMap<usize, State> {
        &self.before
    }

    pub fn after_states(&self) -> &BTreeMap<usize, State> {
        &self.after
    }
}

/// Iterates the given analysis over the graph until the flow values stop
/// changing.
///
/// `entries` names the vertices that receive `entry_state()`: the CFG
/// entry for a forward analysis, the exit vertices for a backward one.
/// Vertices the flow never reaches keep no state and queries against them
/// report no information.
pub fn fixed_point<A, V, E, State>(
    analysis: &A,
    graph: &Graph<V, E>,
    entries: &[usize],
) -> Result<FlowResult<State>, Error>
where
    A: FixedPointAnalysis<V, State>,
    V: Vertex,
    E: Edge,
    State: Clone + Debug + PartialEq,
{
    if entries.is_empty() {
        return Err(Error::NoEntryVertices);
    }
    for &entry in entries {
        graph.vertex(entry)?;
    }

    let direction = analysis.direction();
    let entry_set: FxHashSet<usize> = entries.iter().cloned().collect();

    let incoming = |index: usize| match direction {
        Direction::Forward => graph.predecessor_indices(index),
        Direction::Backward => graph.successor_indices(index),
    };
    let outgoing = |index: usize| match direction {
        Direction::Forward => graph.successor_indices(index),
        Direction::Backward => graph.predecessor_indices(index),
    };

    // Seed the worklist in reverse post-order from the entries. Any fair
    // order converges; this one minimizes recomputation.
    let order = flow_order(graph, entries, &outgoing)?;

    let mut before: BTreeMap<usize, State> = BTreeMap::new();
    let mut after: BTreeMap<usize, State> = BTreeMap::new();

    let mut queue: VecDeque<usize> = order.iter().cloned().collect();
    let mut queued: FxHashSet<usize> = order.iter().cloned().collect();

    while let Some(index) = queue.pop_front() {
        queued.remove(&index);
        let vertex = graph.vertex(index)?;

        // merge the out-flow of every vertex the flow arrives from
        let mut in_state: Option<State> = None;
        for neighbor in incoming(index)? {
            let neighbor_state = match direction {
                Direction::Forward => after.get(&neighbor),
                Direction::Backward => before.get(&neighbor),
            };
            if let Some(state) = neighbor_state {
                in_state = Some(match in_state {
                    Some(merged) => analysis.merge(merged, state)?,
                    None => state.clone(),
                });
            }
        }

        let in_state = match in_state {
            Some(state) if entry_set.contains(&index) => {
                analysis.merge(state, &analysis.entry_state())?
            }
            Some(state) => state,
            None if entry_set.contains(&index) => analysis.entry_state(),
            None => analysis.initial_state(),
        };

        let out_state = analysis.transfer(vertex, &in_state)?;

        let changed = match direction {
            Direction::Forward => after.get(&index) != Some(&out_state),
            Direction::Backward => before.get(&index) != Some(&out_state),
        };

        match direction {
            Direction::Forward => {
                before.insert(index, in_state);
                after.insert(index, out_state);
            }
            Direction::Backward => {
                after.insert(index, in_state);
                before.insert(index, out_state);
            }
        }

        if changed {
            trace!("fixed_point: vertex {} changed", index);
            for neighbor in outgoing(index)? {
                if queued.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
    }

    Ok(FlowResult { before, after })
}

/// Reverse post-order along the analysis direction, entries first, with
/// any vertices the entries cannot reach appended at the end.
fn flow_order<F>(
    graph: &Graph<impl Vertex, impl Edge>,
    entries: &[usize],
    outgoing: &F,
) -> Result<Vec<usize>, Error>
where
    F: Fn(usize) -> Result<Vec<usize>, Error>,
{
    let mut order: Vec<usize> = Vec::new();
    let mut visited: FxHashSet<usize> = FxHashSet::default();

    for &entry in entries {
        if !visited.insert(entry) {
            continue;
        }
        let mut stack: Vec<(usize, Vec<usize>)> = vec![(entry, outgoing(entry)?)];
        while let Some((node, mut children)) = stack.pop() {
            match children.pop() {
                Some(child) => {
                    stack.push((node, children));
                    if visited.insert(child) {
                        stack.push((child, outgoing(child)?));
                    }
                }
                None => order.push(node),
            }
        }
    }
    order.reverse();

    for index in graph.vertex_indices() {
        if !visited.contains(&index) {
            order.push(index);
        }
    }

    Ok(order)
}
