//! Property-bag hashing for change detection.
//!
//! This module provides deterministic hashing of property bags to detect
//! changes between runs and enable idempotent operations. Bags serialize
//! through ordered maps, so the JSON form is canonical.

use sha2::{Digest, Sha256};

use crate::graph::PropertyBag;

/// Hasher for computing property-bag hashes.
#[derive(Debug, Default)]
pub struct PropertyHasher;

impl PropertyHasher {
    /// Creates a new property hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a resource's kind and property bag.
    ///
    /// The hash changes when the kind or any property changes; references
    /// hash by target identity, not by resolved value.
    #[must_use]
    pub fn hash_resource(&self, kind: &str, properties: &PropertyBag) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0u8]);
        // BTreeMap keys are ordered, so this serialization is canonical.
        let canonical = serde_json::to_vec(properties).unwrap_or_default();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}
