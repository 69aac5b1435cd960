//! Resource kind capability registry.
//!
//! Each resource kind has different immutability rules and replace
//! semantics. Rather than per-kind types, the engine dispatches through a
//! lookup table keyed by kind tag; new kinds register a table entry.

use std::collections::{HashMap, HashSet};

/// How a resource is replaced when an immutable property changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceStrategy {
    /// Create the successor first, then delete the old instance
    /// (minimizes downtime).
    #[default]
    CreateBeforeDelete,
    /// Delete the old instance first. Required for kinds where two live
    /// instances would violate a uniqueness constraint.
    DeleteBeforeCreate,
}

/// Capability entry for a single resource kind.
#[derive(Debug, Clone)]
pub struct ResourceKindSpec {
    /// Kind tag (e.g., `storage.bucket`).
    pub kind: String,
    /// Properties that cannot change in place; a change forces a Replace.
    pub immutable_properties: HashSet<String>,
    /// Replace ordering for this kind.
    pub replace_strategy: ReplaceStrategy,
}

/// Lookup table of resource kind capabilities.
#[derive(Debug, Clone)]
pub struct ResourceKindRegistry {
    /// Kind tag -> capability entry.
    kinds: HashMap<String, ResourceKindSpec>,
}

impl ResourceKindSpec {
    /// Creates a new kind entry.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        immutable: &[&str],
        replace_strategy: ReplaceStrategy,
    ) -> Self {
        Self {
            kind: kind.into(),
            immutable_properties: immutable.iter().map(|p| (*p).to_string()).collect(),
            replace_strategy,
        }
    }

    /// Returns true if the named property is immutable for this kind.
    #[must_use]
    pub fn is_immutable(&self, property: &str) -> bool {
        self.immutable_properties.contains(property)
    }
}

impl ResourceKindRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Registers a kind entry, replacing any previous entry for the tag.
    pub fn register(&mut self, spec: ResourceKindSpec) {
        self.kinds.insert(spec.kind.clone(), spec);
    }

    /// Looks up the entry for a kind tag.
    ///
    /// Unknown kinds return `None`; the diff engine then conservatively
    /// classifies any property difference as Replace.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&ResourceKindSpec> {
        self.kinds.get(kind)
    }

    /// Replace strategy for a kind; unknown kinds use the default.
    #[must_use]
    pub fn replace_strategy(&self, kind: &str) -> ReplaceStrategy {
        self.get(kind)
            .map_or_else(ReplaceStrategy::default, |s| s.replace_strategy)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for ResourceKindRegistry {
    /// Registry with the built-in kinds for the three-tier stack.
    fn default() -> Self {
        let mut registry = Self::empty();

        // Bucket names are globally unique, so the old instance must go
        // before its successor can claim the name.
        registry.register(ResourceKindSpec::new(
            "storage.bucket",
            &["name", "region"],
            ReplaceStrategy::DeleteBeforeCreate,
        ));
        registry.register(ResourceKindSpec::new(
            "network.vpc",
            &["cidr_block", "max_azs"],
            ReplaceStrategy::CreateBeforeDelete,
        ));
        registry.register(ResourceKindSpec::new(
            "container.cluster",
            &["vpc_id"],
            ReplaceStrategy::CreateBeforeDelete,
        ));
        registry.register(ResourceKindSpec::new(
            "container.service",
            &["cluster_id"],
            ReplaceStrategy::CreateBeforeDelete,
        ));
        // Database identifiers are unique per account.
        registry.register(ResourceKindSpec::new(
            "database.instance",
            &["engine", "engine_version", "vpc_id"],
            ReplaceStrategy::DeleteBeforeCreate,
        ));

        registry
    }
}
