//! On-disk memoization for analyzed method graphs: a string-intern
//! table, an append-only method offset index, and a variable-length
//! graph dump with a human-readable text mirror.
//!
//! This crate is deliberately graph-shape-agnostic — it has no
//! knowledge of the analyzer's own node types, only of the flattened
//! [graph::MethodGraph] record the analyzer builds from them. That
//! keeps the dependency one-directional: the analyzer depends on this
//! crate, never the reverse.

pub mod errors;
pub mod graph;
pub mod poff;
pub mod strdict;

pub use errors::PersistError;
pub use graph::{FieldSlot, GraphHeader, GraphStore, MethodGraph, NodeRecord};
pub use poff::{OffsetIndex, OffsetRecord};
pub use strdict::StringDict;
