//! State snapshot types.
//!
//! These types record the last-known provider-side identity and last-applied
//! property bag per logical id, used as the diff baseline and for ordering
//! deletes of resources that are no longer declared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::graph::PropertyBag;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Provider-reported output attributes of a resource.
pub type OutputMap = BTreeMap<String, serde_json::Value>;

/// The complete persisted snapshot of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State format version.
    pub version: String,
    /// Stack name.
    pub stack: String,
    /// Environment name.
    pub environment: String,
    /// Records keyed by logical id.
    pub resources: HashMap<String, ResourceRecord>,
    /// When the snapshot was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent run history.
    #[serde(default)]
    pub history: Vec<RunHistoryEntry>,
}

/// Last-applied record for a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Logical id (from the stack document).
    pub logical_id: String,
    /// Provider-assigned physical identity.
    pub provider_id: String,
    /// Resource kind tag.
    pub kind: String,
    /// Last-applied property bag, as declared (references unresolved).
    pub properties: PropertyBag,
    /// Hash of kind + property bag at apply time.
    pub property_hash: String,
    /// Output attributes reported by the provider.
    #[serde(default)]
    pub outputs: OutputMap,
    /// Dependency ids at apply time. Persisted so deletes of resources no
    /// longer declared can still be ordered.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// When the resource was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Type of run.
    pub operation: RunOperation,
    /// Resources touched by the run.
    pub resources: Vec<String>,
    /// Whether every entry succeeded.
    pub success: bool,
    /// Optional error summary.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of runs recorded in history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOperation {
    /// Converge toward the declared graph.
    Apply,
    /// Tear everything down.
    Destroy,
}

impl StateSnapshot {
    /// Creates a new empty snapshot (first run baseline).
    #[must_use]
    pub fn new(stack: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            stack: stack.to_string(),
            environment: environment.to_string(),
            resources: HashMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by logical id.
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<&ResourceRecord> {
        self.resources.get(logical_id)
    }

    /// Returns true if a record exists for the logical id.
    #[must_use]
    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    /// Adds or replaces a record.
    pub fn upsert(&mut self, record: ResourceRecord) {
        self.resources.insert(record.logical_id.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record by logical id.
    pub fn remove(&mut self, logical_id: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(logical_id);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// All logical ids in the snapshot.
    #[must_use]
    pub fn logical_ids(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Logical ids of recorded resources that depend on the given id.
    #[must_use]
    pub fn dependents_of(&self, logical_id: &str) -> Vec<&str> {
        self.resources
            .values()
            .filter(|r| r.dependencies.iter().any(|d| d == logical_id))
            .map(|r| r.logical_id.as_str())
            .collect()
    }

    /// Appends a history entry, keeping only the most recent entries.
    pub fn add_history(&mut self, entry: RunHistoryEntry) {
        const MAX_HISTORY: usize = 100;
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns true if the snapshot records no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceRecord {
    /// Creates a new record at creation time.
    #[must_use]
    pub fn new(
        logical_id: &str,
        provider_id: &str,
        kind: &str,
        properties: PropertyBag,
        property_hash: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            logical_id: logical_id.to_string(),
            provider_id: provider_id.to_string(),
            kind: kind.to_string(),
            properties,
            property_hash: property_hash.to_string(),
            outputs: OutputMap::new(),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the dependency edges recorded for delete ordering.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets provider-reported outputs.
    #[must_use]
    pub fn with_outputs(mut self, outputs: OutputMap) -> Self {
        self.outputs = outputs;
        self
    }

    /// Looks up an output attribute; `id` always resolves to the provider id.
    #[must_use]
    pub fn output(&self, attribute: &str) -> Option<serde_json::Value> {
        if attribute == "id" {
            return Some(serde_json::Value::String(self.provider_id.clone()));
        }
        self.outputs.get(attribute).cloned()
    }
}

impl RunHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: RunOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: RunOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
