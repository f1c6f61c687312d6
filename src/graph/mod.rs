//! Resource model and dependency graph.
//!
//! This module holds everything that describes *what* should exist:
//! - Resource identifiers, declarations and attribute expressions
//! - The dependency DAG and its deterministic topological order

mod dag;
mod resource;

pub use dag::ResourceGraph;
pub(crate) use dag::sort_by_index;
pub use resource::{
    AttributeMap, Evaluated, Expr, Lifecycle, Reference, Resource, ResourceId, SecretRef,
};
