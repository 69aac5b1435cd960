//! Provider trait definition.
//!
//! Each operation is potentially asynchronous on the provider side
//! (poll-until-terminal); implementations block their caller until the
//! provider reports a terminal status, so from the executor's perspective
//! every call is a plain awaited operation.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::OutputMap;

/// A property bag after reference resolution: plain JSON values only.
pub type ResolvedBag = serde_json::Map<String, serde_json::Value>;

/// Result of a successful create operation.
#[derive(Debug, Clone)]
pub struct CreatedResource {
    /// Provider-assigned physical identity.
    pub provider_id: String,
    /// Output attributes reported by the provider.
    pub outputs: OutputMap,
}

/// Trait for provider-facing resource operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Creates a resource of the given kind.
    async fn create(&self, kind: &str, properties: &ResolvedBag) -> Result<CreatedResource>;

    /// Updates a resource in place.
    async fn update(
        &self,
        kind: &str,
        provider_id: &str,
        properties: &ResolvedBag,
    ) -> Result<OutputMap>;

    /// Deletes a resource.
    async fn delete(&self, kind: &str, provider_id: &str) -> Result<()>;
}
