//! Osprey is a library for flow-sensitive alias analysis over procedure
//! control-flow graphs.
//!
//! Three analyses are provided, all built on one generic fixed-point
//! engine:
//!
//! * [`analysis::must_alias`] computes, per program point, the locations
//!   guaranteed to denote the same object.
//! * [`analysis::may_alias`] computes the locations which might denote the
//!   same object, with an explicit "unknown" sink for untracked values.
//! * [`analysis::side_effects`] computes, per method in a program's call
//!   graph, whether the method may observably write state. Its result can
//!   be handed to the alias analyses to make their handling of calls
//!   precise instead of maximally conservative.
//!
//! Procedures are described to the library through the [`ir`] module: a
//! control-flow graph with one statement per node, where each statement
//! classifies its reads and writes as locals, fields, casts, allocations,
//! calls, or opaque expressions. Consumers that rewrite code based on the
//! results live outside this crate; they only use the query interfaces on
//! [`analysis::MustAlias`], [`analysis::MayAlias`] and
//! [`analysis::SideEffects`].

pub mod analysis;
pub mod graph;
pub mod ir;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vertex {0} does not exist in this graph")]
    GraphVertexNotFound(usize),

    #[error("edge {0}->{1} does not exist in this graph")]
    GraphEdgeNotFound(usize, usize),

    #[error("control-flow graph has no entry statement set")]
    NoEntry,

    #[error("statement {0} is unreachable from the entry")]
    UnreachableStatement(usize),

    #[error("location {0} is not registered in this procedure")]
    UnknownLocation(usize),

    #[error("method {0} does not exist in this program")]
    MethodNotFound(usize),

    #[error("fixed-point analysis was given no entry vertices")]
    NoEntryVertices,

    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
