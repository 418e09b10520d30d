//! A `Statement` is one node of a control-flow graph.

use crate::graph;
use crate::ir::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The source of an assignment, classified by how trackable it is.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rvalue {
    /// A read of a local or field.
    Location(Location),
    /// A checked cast wrapping a trackable location. The cast does not
    /// change which object the value denotes.
    Cast(Location),
    /// A fresh object or array allocation.
    New,
    /// Anything else: arithmetic, constants, values produced outside the
    /// tracked location set.
    Opaque,
}

impl Rvalue {
    /// The underlying location for a direct read or a cast.
    pub fn location(&self) -> Option<Location> {
        match self {
            Rvalue::Location(location) | Rvalue::Cast(location) => Some(*location),
            Rvalue::New | Rvalue::Opaque => None,
        }
    }
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rvalue::Location(location) => write!(f, "{}", location),
            Rvalue::Cast(location) => write!(f, "(cast) {}", location),
            Rvalue::New => write!(f, "new"),
            Rvalue::Opaque => write!(f, "opaque"),
        }
    }
}

/// The possible callees of a call statement.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CallTargets {
    /// Method indices into the program's method table.
    Resolved(Vec<usize>),
    /// The callee could not be resolved against the call graph.
    Unresolved,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operation {
    /// `dst := src`
    Assign { dst: Location, src: Rvalue },
    /// A method call, optionally defining a result location.
    Call {
        result: Option<Location>,
        targets: CallTargets,
    },
    /// A statement that neither defines a location nor calls.
    Nop,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Assign { dst, src } => write!(f, "{} = {}", dst, src),
            Operation::Call { result, targets } => {
                if let Some(result) = result {
                    write!(f, "{} = ", result)?;
                }
                match targets {
                    CallTargets::Resolved(targets) => write!(f, "call {:?}", targets),
                    CallTargets::Unresolved => write!(f, "call ?"),
                }
            }
            Operation::Nop => write!(f, "nop"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Statement {
    operation: Operation,
    index: usize,
}

impl Statement {
    pub fn new(index: usize, operation: Operation) -> Statement {
        Statement { operation, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn is_call(&self) -> bool {
        matches!(self.operation, Operation::Call { .. })
    }

    /// The at-most-one location this statement (conditionally) defines.
    pub fn defined_location(&self) -> Option<Location> {
        match &self.operation {
            Operation::Assign { dst, .. } => Some(*dst),
            Operation::Call { result, .. } => *result,
            Operation::Nop => None,
        }
    }

    /// The locations this statement reads.
    pub fn read_locations(&self) -> Vec<Location> {
        match &self.operation {
            Operation::Assign { src, .. } => src.location().into_iter().collect(),
            Operation::Call { .. } | Operation::Nop => Vec::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02} {}", self.index, self.operation)
    }
}

impl graph::Vertex for Statement {
    fn index(&self) -> usize {
        self.index
    }
    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}
