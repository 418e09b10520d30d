//! The intermediate representation the analyses run over.
//!
//! A [`Procedure`] owns a table of aliasable [`Location`]s and a
//! [`ControlFlowGraph`] with one [`Statement`] per node. A [`Program`] is a
//! collection of [`Method`]s, from which a call graph can be derived for
//! the side-effect analysis.

mod control_flow_graph;
mod location;
mod procedure;
mod program;
mod statement;

pub use self::control_flow_graph::ControlFlowGraph;
pub use self::location::{Location, LocationKind, Locations};
pub use self::procedure::Procedure;
pub use self::program::{CallEdge, Method, MethodRef, Program};
pub use self::statement::{CallTargets, Operation, Rvalue, Statement};
