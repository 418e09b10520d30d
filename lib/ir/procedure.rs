//! A `Procedure` pairs a location table with a control-flow graph.

use crate::ir::{ControlFlowGraph, Locations, Operation, Rvalue};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Procedure {
    name: String,
    locations: Locations,
    control_flow_graph: ControlFlowGraph,
}

impl Procedure {
    pub fn new<S: Into<String>>(name: S) -> Procedure {
        Procedure {
            name: name.into(),
            locations: Locations::new(),
            control_flow_graph: ControlFlowGraph::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    pub fn locations_mut(&mut self) -> &mut Locations {
        &mut self.locations
    }

    pub fn control_flow_graph(&self) -> &ControlFlowGraph {
        &self.control_flow_graph
    }

    pub fn control_flow_graph_mut(&mut self) -> &mut ControlFlowGraph {
        &mut self.control_flow_graph
    }

    /// Checks the structural invariants the analyses rely on, before any
    /// iteration starts:
    ///
    /// * an entry statement is set,
    /// * every statement is reachable from the entry,
    /// * every location a statement mentions is registered in this
    ///   procedure's table.
    ///
    /// Dangling edges cannot occur; edge insertion already rejects
    /// endpoints that are not in the graph.
    pub fn validate(&self) -> Result<(), Error> {
        let cfg = &self.control_flow_graph;
        let entry = cfg.entry().ok_or(Error::NoEntry)?;

        let unreachable = cfg.graph().unreachable_vertices(entry)?;
        if let Some(index) = unreachable.iter().min() {
            return Err(Error::UnreachableStatement(*index));
        }

        for statement in cfg.statements() {
            let mut mentioned = Vec::new();
            match statement.operation() {
                Operation::Assign { dst, src } => {
                    mentioned.push(*dst);
                    if let Rvalue::Location(src) | Rvalue::Cast(src) = src {
                        mentioned.push(*src);
                    }
                }
                Operation::Call { result, .. } => {
                    if let Some(result) = result {
                        mentioned.push(*result);
                    }
                }
                Operation::Nop => {}
            }
            for location in mentioned {
                if !self.locations.contains(location) {
                    return Err(Error::UnknownLocation(location.index()));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "procedure {}", self.name)?;
        write!(f, "{}", self.control_flow_graph)
    }
}
