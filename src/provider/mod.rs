//! Provider API for the Stackform provisioning engine.
//!
//! The provider is the external collaborator that actually mutates remote
//! state. The engine talks to it through the [`Provider`] trait; the
//! bundled implementation speaks JSON over HTTP to a control plane.

mod api;
mod http;

pub use api::{CreatedResource, Provider, ResolvedBag};
pub use http::HttpProvider;

#[cfg(test)]
pub use api::MockProvider;
