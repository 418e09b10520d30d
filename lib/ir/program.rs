//! Programs, methods, and the derived call graph.

use crate::graph::{self, Graph};
use crate::ir::{CallTargets, Operation, Procedure};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A method in a program. A method without a retrievable body (`procedure`
/// is `None`) is treated conservatively by the side-effect analysis.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Method {
    index: usize,
    name: String,
    procedure: Option<Procedure>,
}

impl Method {
    pub fn new<S: Into<String>>(index: usize, name: S, procedure: Option<Procedure>) -> Method {
        Method {
            index,
            name: name.into(),
            procedure,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn procedure(&self) -> Option<&Procedure> {
        self.procedure.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.procedure.is_some()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.procedure {
            Some(_) => write!(f, "method {} {}", self.index, self.name),
            None => write!(f, "method {} {} <no body>", self.index, self.name),
        }
    }
}

/// A call-graph vertex. Carries only the method index; the `Program` owns
/// the methods.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct MethodRef {
    index: usize,
}

impl MethodRef {
    pub fn new(index: usize) -> MethodRef {
        MethodRef { index }
    }
}

impl graph::Vertex for MethodRef {
    fn index(&self) -> usize {
        self.index
    }
    fn dot_label(&self) -> String {
        format!("method {}", self.index)
    }
}

/// A caller/callee edge in the call graph.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallEdge {
    caller: usize,
    callee: usize,
}

impl CallEdge {
    pub fn new(caller: usize, callee: usize) -> CallEdge {
        CallEdge { caller, callee }
    }
}

impl graph::Edge for CallEdge {
    fn head(&self) -> usize {
        self.caller
    }
    fn tail(&self) -> usize {
        self.callee
    }
    fn dot_label(&self) -> String {
        format!("{} calls {}", self.caller, self.callee)
    }
}

/// A whole-program snapshot: the methods the side-effect analysis may
/// reason about. Call targets that resolve outside this set are treated as
/// unanalyzable.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Program {
    methods: BTreeMap<usize, Method>,
}

impl Program {
    pub fn new() -> Program {
        Program {
            methods: BTreeMap::new(),
        }
    }

    /// Adds a method to this program.
    /// # Errors
    /// Error if a method with the same index already exists.
    pub fn add_method(&mut self, method: Method) -> Result<(), Error> {
        if self.methods.contains_key(&method.index()) {
            return Err("duplicate method index".into());
        }
        self.methods.insert(method.index(), method);
        Ok(())
    }

    pub fn method(&self, index: usize) -> Result<&Method, Error> {
        self.methods.get(&index).ok_or(Error::MethodNotFound(index))
    }

    pub fn has_method(&self, index: usize) -> bool {
        self.methods.contains_key(&index)
    }

    pub fn methods(&self) -> Vec<&Method> {
        self.methods.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Derives the caller/callee graph from resolved call targets in
    /// method bodies. Targets that are not methods of this program get no
    /// edge; the side-effect analysis accounts for them separately when it
    /// scans the body.
    pub fn call_graph(&self) -> Result<Graph<MethodRef, CallEdge>, Error> {
        let mut call_graph = Graph::new();

        for &index in self.methods.keys() {
            call_graph.insert_vertex(MethodRef::new(index))?;
        }

        for method in self.methods.values() {
            let procedure = match method.procedure() {
                Some(procedure) => procedure,
                None => continue,
            };
            for statement in procedure.control_flow_graph().statements() {
                let targets = match statement.operation() {
                    Operation::Call { targets, .. } => targets,
                    _ => continue,
                };
                if let CallTargets::Resolved(targets) = targets {
                    for &target in targets {
                        if !self.has_method(target) {
                            continue;
                        }
                        if !call_graph.has_edge(method.index(), target) {
                            call_graph.insert_edge(CallEdge::new(method.index(), target))?;
                        }
                    }
                }
            }
        }

        Ok(call_graph)
    }
}
