//! A `ControlFlowGraph` is a directed `Graph` with one `Statement` per
//! vertex.

use crate::graph::{Graph, NullEdge};
use crate::ir::{CallTargets, Location, Operation, Rvalue, Statement};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ControlFlowGraph {
    // The internal graph used to store our statements.
    graph: Graph<Statement, NullEdge>,
    // The next index to use when creating a statement.
    next_index: usize,
    // An optional entry index for the graph.
    entry: Option<usize>,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph {
            graph: Graph::new(),
            next_index: 0,
            entry: None,
        }
    }

    /// Returns the underlying graph
    pub fn graph(&self) -> &Graph<Statement, NullEdge> {
        &self.graph
    }

    /// Get the entry `Statement` index for this `ControlFlowGraph`.
    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    /// Sets the entry point for this `ControlFlowGraph` to the given
    /// `Statement` index.
    pub fn set_entry(&mut self, entry: usize) -> Result<(), Error> {
        if !self.graph.has_vertex(entry) {
            return Err(Error::GraphVertexNotFound(entry));
        }
        self.entry = Some(entry);
        Ok(())
    }

    /// Get a `Statement` by index.
    pub fn statement(&self, index: usize) -> Result<&Statement, Error> {
        self.graph.vertex(index)
    }

    /// Get every `Statement` in this `ControlFlowGraph`.
    pub fn statements(&self) -> Vec<&Statement> {
        self.graph.vertices()
    }

    /// Appends a statement with the given operation, returning its index.
    pub fn push(&mut self, operation: Operation) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        // indices are issued by this graph, so insertion cannot collide
        self.graph
            .insert_vertex(Statement::new(index, operation))
            .unwrap();
        index
    }

    /// Appends `dst := src`, returning the statement index.
    pub fn assign(&mut self, dst: Location, src: Rvalue) -> usize {
        self.push(Operation::Assign { dst, src })
    }

    /// Appends a call statement, returning the statement index.
    pub fn call(&mut self, result: Option<Location>, targets: CallTargets) -> usize {
        self.push(Operation::Call { result, targets })
    }

    /// Appends a statement with no definitions or calls, returning the
    /// statement index.
    pub fn nop(&mut self) -> usize {
        self.push(Operation::Nop)
    }

    /// Creates an edge from one statement to another.
    pub fn edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(NullEdge::new(head, tail))
    }

    /// Chains the given statements together with unconditional edges, in
    /// order.
    pub fn chain(&mut self, indices: &[usize]) -> Result<(), Error> {
        for pair in indices.windows(2) {
            self.edge(pair[0], pair[1])?;
        }
        Ok(())
    }
}

impl Default for ControlFlowGraph {
    fn default() -> ControlFlowGraph {
        ControlFlowGraph::new()
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for statement in self.statements() {
            writeln!(f, "{}", statement)?;
        }
        for edge in self.graph.edges() {
            use crate::graph::Edge;
            writeln!(f, "edge {} -> {}", edge.head(), edge.tail())?;
        }
        Ok(())
    }
}
