//! Stack document schema types.
//!
//! This module defines the structs that map to the `stack.yaml` file. These
//! types are purely declarative and fully describe the desired state; the
//! engine never mutates them after parsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root structure of a stack document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackDocument {
    /// Stack-level configuration.
    pub stack: StackConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Provider endpoint configuration.
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    /// Declared resources, in declaration order.
    pub resources: Vec<ResourceDecl>,
}

/// Stack-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Unique name for the stack.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// State file path (defaults to `.stackform/state.json`).
    #[serde(default)]
    pub path: Option<String>,
}

/// Provider endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the provider control plane.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default)]
    pub token_env: Option<String>,
}

/// A single declared resource.
///
/// Property values are kept as raw YAML here; the graph builder converts
/// them to typed values and extracts `${logical_id.attribute}` references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDecl {
    /// Stack-unique logical id.
    pub id: String,
    /// Resource kind tag (e.g., `storage.bucket`, `database.instance`).
    pub kind: String,
    /// Named properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
    /// Explicit dependencies, in addition to those inferred from references.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Default environment name.
fn default_environment() -> String {
    String::from("dev")
}

impl StackDocument {
    /// Returns the declared resource with the given logical id, if any.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.id == id)
    }
}
