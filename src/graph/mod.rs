//! Resource graph model for the Stackform provisioning engine.
//!
//! A stack document is turned into a directed acyclic graph of typed
//! resource nodes. The graph is built once per provisioning run and is
//! immutable afterwards.

mod build;
mod model;

pub use build::GraphBuilder;
pub use model::{PropertyBag, PropertyValue, Reference, ResourceGraph, ResourceNode};
