//! Shared leaf types for the Weft Rust backend.
//!
//! Everything here is dependency-light and consumed by every other crate
//! in the workspace: source spans, identifier style conversion, and the
//! per-library module graph.

pub mod ident;
pub mod module_graph;
pub mod span;

pub use module_graph::{topological_sort, CycleError, ModuleGraph, ModuleId, ModuleInfo};
pub use span::Span;
