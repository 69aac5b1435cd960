//! Diff engine for comparing the desired graph against the baseline.
//!
//! For each logical id in the union of desired and baseline ids the engine
//! classifies the required operation: Create, Update, Replace (expanded to a
//! Create/Delete pair), Delete, or NoOp. Entry order is declaration order;
//! the final execution order is decided later by the scheduler.

use std::collections::HashSet;
use tracing::debug;

use crate::document::PropertyHasher;
use crate::graph::{PropertyBag, ResourceGraph, ResourceNode};
use crate::registry::{ReplaceStrategy, ResourceKindRegistry};
use crate::state::{ResourceRecord, StateSnapshot};

/// Engine for computing change sets.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Property-bag hasher for the fast no-change path.
    hasher: PropertyHasher,
}

/// The operation required for one logical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Resource needs to be created.
    Create,
    /// Resource needs to be updated in place.
    Update,
    /// Resource needs to be deleted.
    Delete,
    /// Resource is unchanged.
    NoOp,
}

/// Marks an entry as one half of a Replace pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceRole {
    /// The create half (successor instance).
    CreateHalf,
    /// The delete half (old instance).
    DeleteHalf,
}

/// One change-set entry. Transient — exists only for the duration of a run.
#[derive(Debug, Clone)]
pub struct ChangeEntry {
    /// Logical id of the resource.
    pub logical_id: String,
    /// Resource kind tag.
    pub kind: String,
    /// Required operation.
    pub operation: OperationKind,
    /// Last-applied property bag (absent for pure creates).
    pub old: Option<PropertyBag>,
    /// Desired property bag (absent for pure deletes).
    pub new: Option<PropertyBag>,
    /// Provider id of the existing instance (for updates and deletes).
    pub provider_id: Option<String>,
    /// Hash of the desired kind + bag (recorded in state on success).
    pub new_hash: Option<String>,
    /// Set when this entry is half of a Replace pair.
    pub replace: Option<ReplaceRole>,
    /// Human-readable reason for the operation.
    pub reason: String,
}

/// Complete diff result, in declaration order.
#[derive(Debug)]
pub struct ChangeSet {
    /// All entries, including NoOps.
    pub entries: Vec<ChangeEntry>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: PropertyHasher::new(),
        }
    }

    /// Computes the change set for a desired graph against a baseline.
    #[must_use]
    pub fn diff(
        &self,
        desired: &ResourceGraph,
        baseline: &StateSnapshot,
        registry: &ResourceKindRegistry,
    ) -> ChangeSet {
        let mut entries = Vec::new();

        for node in desired.nodes() {
            let new_hash = self.hasher.hash_resource(&node.kind, &node.properties);
            match baseline.get(&node.id) {
                None => {
                    debug!("Resource '{}' needs to be created", node.id);
                    entries.push(Self::create_entry(node, &new_hash, None, "Not yet provisioned"));
                }
                Some(record) => {
                    Self::diff_existing(node, record, &new_hash, registry, &mut entries);
                }
            }
        }

        Self::cascade_replacements(desired, registry, &mut entries);

        // Resources recorded in state but no longer declared. Snapshot
        // iteration order is unstable, so sort for a deterministic set.
        let mut orphaned: Vec<&ResourceRecord> = baseline
            .resources
            .values()
            .filter(|r| !desired.contains(&r.logical_id))
            .collect();
        orphaned.sort_by(|a, b| a.logical_id.cmp(&b.logical_id));

        for record in orphaned {
            debug!("Resource '{}' was removed from the stack", record.logical_id);
            entries.push(ChangeEntry {
                logical_id: record.logical_id.clone(),
                kind: record.kind.clone(),
                operation: OperationKind::Delete,
                old: Some(record.properties.clone()),
                new: None,
                provider_id: Some(record.provider_id.clone()),
                new_hash: None,
                replace: None,
                reason: String::from("Removed from stack document"),
            });
        }

        ChangeSet { entries }
    }

    /// Classifies a resource present in both desired and baseline.
    fn diff_existing(
        node: &ResourceNode,
        record: &ResourceRecord,
        new_hash: &str,
        registry: &ResourceKindRegistry,
        entries: &mut Vec<ChangeEntry>,
    ) {
        if record.property_hash == new_hash && record.kind == node.kind {
            debug!("Resource '{}' is up to date", node.id);
            entries.push(ChangeEntry {
                logical_id: node.id.clone(),
                kind: node.kind.clone(),
                operation: OperationKind::NoOp,
                old: Some(record.properties.clone()),
                new: Some(node.properties.clone()),
                provider_id: Some(record.provider_id.clone()),
                new_hash: Some(new_hash.to_string()),
                replace: None,
                reason: String::new(),
            });
            return;
        }

        let changed = changed_properties(&record.properties, &node.properties);
        let needs_replace = Self::requires_replace(node, record, &changed, registry);

        if needs_replace {
            debug!(
                "Resource '{}' requires replacement ({})",
                node.id,
                changed.join(", ")
            );
            let reason = format!("Immutable change: {}", changed.join(", "));
            let create = Self::create_entry(
                node,
                new_hash,
                Some(ReplaceRole::CreateHalf),
                &reason,
            );
            let delete = ChangeEntry {
                logical_id: node.id.clone(),
                kind: record.kind.clone(),
                operation: OperationKind::Delete,
                old: Some(record.properties.clone()),
                new: None,
                provider_id: Some(record.provider_id.clone()),
                new_hash: None,
                replace: Some(ReplaceRole::DeleteHalf),
                reason,
            };

            // Pair order here is presentation-only; the scheduler decides
            // final positions from the kind's replace strategy.
            match registry.replace_strategy(&node.kind) {
                ReplaceStrategy::CreateBeforeDelete => {
                    entries.push(create);
                    entries.push(delete);
                }
                ReplaceStrategy::DeleteBeforeCreate => {
                    entries.push(delete);
                    entries.push(create);
                }
            }
        } else {
            debug!("Resource '{}' needs update ({})", node.id, changed.join(", "));
            entries.push(ChangeEntry {
                logical_id: node.id.clone(),
                kind: node.kind.clone(),
                operation: OperationKind::Update,
                old: Some(record.properties.clone()),
                new: Some(node.properties.clone()),
                provider_id: Some(record.provider_id.clone()),
                new_hash: Some(new_hash.to_string()),
                replace: None,
                reason: format!("Changed: {}", changed.join(", ")),
            });
        }
    }

    /// Replacing a resource changes its provider id, so every consumer that
    /// references it must be re-pointed: a NoOp consumer becomes an Update,
    /// and a consumer whose referencing property is immutable (or whose kind
    /// is unknown) is replaced itself. Replacements propagate transitively;
    /// updates do not, since an update keeps the provider id stable.
    fn cascade_replacements(
        desired: &ResourceGraph,
        registry: &ResourceKindRegistry,
        entries: &mut Vec<ChangeEntry>,
    ) {
        let mut replaced: HashSet<String> = entries
            .iter()
            .filter(|e| e.replace == Some(ReplaceRole::CreateHalf))
            .map(|e| e.logical_id.clone())
            .collect();

        loop {
            let mut changed_any = false;

            for node in desired.nodes() {
                if replaced.contains(&node.id) {
                    continue;
                }
                let Some(i) = entries.iter().position(|e| {
                    e.logical_id == node.id
                        && e.replace.is_none()
                        && matches!(e.operation, OperationKind::NoOp | OperationKind::Update)
                }) else {
                    continue;
                };

                let referencing = referencing_properties(node, &replaced);
                if referencing.is_empty() {
                    continue;
                }

                let needs_replace = registry.get(&node.kind).map_or(true, |spec| {
                    referencing.iter().any(|p| spec.is_immutable(p))
                });
                let reason = format!("Replaced dependency: {}", referencing.join(", "));

                if needs_replace {
                    debug!(
                        "Resource '{}' is replaced along with its dependency",
                        node.id
                    );
                    let entry = entries.remove(i);
                    let new_hash = entry.new_hash.clone().unwrap_or_default();
                    let create = Self::create_entry(
                        node,
                        &new_hash,
                        Some(ReplaceRole::CreateHalf),
                        &reason,
                    );
                    let delete = ChangeEntry {
                        logical_id: node.id.clone(),
                        kind: entry.kind.clone(),
                        operation: OperationKind::Delete,
                        old: entry.old.clone(),
                        new: None,
                        provider_id: entry.provider_id.clone(),
                        new_hash: None,
                        replace: Some(ReplaceRole::DeleteHalf),
                        reason,
                    };
                    match registry.replace_strategy(&node.kind) {
                        ReplaceStrategy::CreateBeforeDelete => {
                            entries.insert(i, delete);
                            entries.insert(i, create);
                        }
                        ReplaceStrategy::DeleteBeforeCreate => {
                            entries.insert(i, create);
                            entries.insert(i, delete);
                        }
                    }
                    replaced.insert(node.id.clone());
                    changed_any = true;
                } else if entries[i].operation == OperationKind::NoOp {
                    debug!("Resource '{}' re-points at a replaced dependency", node.id);
                    entries[i].operation = OperationKind::Update;
                    entries[i].reason = reason;
                    changed_any = true;
                }
            }

            if !changed_any {
                break;
            }
        }
    }

    /// Update-vs-Replace tie-break: the kind's declared immutable set is
    /// authoritative; unknown kinds conservatively replace, as does a
    /// change of the kind tag itself.
    fn requires_replace(
        node: &ResourceNode,
        record: &ResourceRecord,
        changed: &[String],
        registry: &ResourceKindRegistry,
    ) -> bool {
        if record.kind != node.kind {
            return true;
        }
        registry.get(&node.kind).map_or(true, |spec| {
            changed.iter().any(|p| spec.is_immutable(p))
        })
    }

    fn create_entry(
        node: &ResourceNode,
        new_hash: &str,
        replace: Option<ReplaceRole>,
        reason: &str,
    ) -> ChangeEntry {
        ChangeEntry {
            logical_id: node.id.clone(),
            kind: node.kind.clone(),
            operation: OperationKind::Create,
            old: None,
            new: Some(node.properties.clone()),
            provider_id: None,
            new_hash: Some(new_hash.to_string()),
            replace,
            reason: reason.to_string(),
        }
    }
}

/// Property names in the node's bag that reference any of the given ids.
fn referencing_properties(node: &ResourceNode, targets: &HashSet<String>) -> Vec<String> {
    let mut props = Vec::new();
    for (name, value) in &node.properties {
        let mut refs = Vec::new();
        value.collect_references(&mut refs);
        if refs.iter().any(|r| targets.contains(&r.resource)) {
            props.push(name.clone());
        }
    }
    props
}

/// Property names whose values differ between two bags (union of keys).
fn changed_properties(old: &PropertyBag, new: &PropertyBag) -> Vec<String> {
    let mut changed = Vec::new();
    for (name, value) in new {
        if old.get(name) != Some(value) {
            changed.push(name.clone());
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            changed.push(name.clone());
        }
    }
    changed
}

impl ChangeSet {
    /// Number of Create entries.
    #[must_use]
    pub fn creates(&self) -> usize {
        self.count(OperationKind::Create)
    }

    /// Number of Update entries.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.count(OperationKind::Update)
    }

    /// Number of Delete entries.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.count(OperationKind::Delete)
    }

    /// Number of NoOp entries.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(OperationKind::NoOp)
    }

    /// Returns true if anything needs to change.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.operation != OperationKind::NoOp)
    }

    /// Entries that require action.
    #[must_use]
    pub fn actionable_entries(&self) -> Vec<&ChangeEntry> {
        self.entries
            .iter()
            .filter(|e| e.operation != OperationKind::NoOp)
            .collect()
    }

    fn count(&self, operation: OperationKind) -> usize {
        self.entries
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation, self.logical_id)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PropertyValue;
    use crate::state::StateSnapshot;

    fn node(id: &str, kind: &str, props: &[(&str, PropertyValue)]) -> ResourceNode {
        ResourceNode {
            id: id.to_string(),
            kind: kind.to_string(),
            properties: props
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            depends_on: Vec::new(),
        }
    }

    fn record_for(node: &ResourceNode, provider_id: &str) -> ResourceRecord {
        let hash = PropertyHasher::new().hash_resource(&node.kind, &node.properties);
        ResourceRecord::new(
            &node.id,
            provider_id,
            &node.kind,
            node.properties.clone(),
            &hash,
        )
    }

    #[test]
    fn desired_only_is_create() {
        let graph = ResourceGraph::from_nodes(vec![node("site", "storage.bucket", &[])]);
        let baseline = StateSnapshot::new("demo", "dev");
        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());

        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].operation, OperationKind::Create);
        assert!(set.entries[0].replace.is_none());
    }

    #[test]
    fn baseline_only_is_delete() {
        let graph = ResourceGraph::empty();
        let mut baseline = StateSnapshot::new("demo", "dev");
        let orphan = node("old", "network.vpc", &[]);
        baseline.upsert(record_for(&orphan, "vpc-9"));

        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].operation, OperationKind::Delete);
        assert_eq!(set.entries[0].provider_id.as_deref(), Some("vpc-9"));
    }

    #[test]
    fn equal_bags_are_noop() {
        let n = node(
            "db",
            "database.instance",
            &[("engine", PropertyValue::String(String::from("postgres")))],
        );
        let graph = ResourceGraph::from_nodes(vec![n.clone()]);
        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&n, "db-1"));

        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].operation, OperationKind::NoOp);
        assert!(!set.has_changes());
    }

    #[test]
    fn mutable_change_is_update() {
        let old = node(
            "svc",
            "container.service",
            &[("desired_count", PropertyValue::Int(2))],
        );
        let new = node(
            "svc",
            "container.service",
            &[("desired_count", PropertyValue::Int(4))],
        );
        let graph = ResourceGraph::from_nodes(vec![new]);
        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old, "svc-1"));

        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].operation, OperationKind::Update);
        assert_eq!(set.entries[0].provider_id.as_deref(), Some("svc-1"));
    }

    #[test]
    fn immutable_change_is_exactly_one_create_and_one_delete() {
        let old = node(
            "db",
            "database.instance",
            &[("engine", PropertyValue::String(String::from("postgres")))],
        );
        let new = node(
            "db",
            "database.instance",
            &[("engine", PropertyValue::String(String::from("mysql")))],
        );
        let graph = ResourceGraph::from_nodes(vec![new]);
        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old, "db-1"));

        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());
        let db_entries: Vec<_> = set.entries.iter().filter(|e| e.logical_id == "db").collect();
        assert_eq!(db_entries.len(), 2);
        assert_eq!(set.creates(), 1);
        assert_eq!(set.deletes(), 1);
        assert_eq!(set.updates(), 0);
        // database.instance replaces delete-first (uniqueness constraint).
        assert_eq!(set.entries[0].operation, OperationKind::Delete);
        assert_eq!(set.entries[0].replace, Some(ReplaceRole::DeleteHalf));
        assert_eq!(set.entries[1].replace, Some(ReplaceRole::CreateHalf));
    }

    #[test]
    fn unknown_kind_conservatively_replaces() {
        let old = node("zone", "dns.zone", &[("ttl", PropertyValue::Int(60))]);
        let new = node("zone", "dns.zone", &[("ttl", PropertyValue::Int(300))]);
        let graph = ResourceGraph::from_nodes(vec![new]);
        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old, "z-1"));

        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());
        assert_eq!(set.creates(), 1);
        assert_eq!(set.deletes(), 1);
        assert_eq!(set.updates(), 0);
    }

    fn reference(resource: &str) -> PropertyValue {
        PropertyValue::Ref(crate::graph::Reference {
            resource: resource.to_string(),
            attribute: String::from("id"),
        })
    }

    #[test]
    fn replacement_cascades_transitively_through_immutable_references() {
        let old_net = node("net", "network.vpc", &[("max_azs", PropertyValue::Int(3))]);
        let new_net = node("net", "network.vpc", &[("max_azs", PropertyValue::Int(2))]);
        let cluster = node("cluster", "container.cluster", &[("vpc_id", reference("net"))]);
        let svc = node("svc", "container.service", &[("cluster_id", reference("cluster"))]);

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old_net, "vpc-old"));
        baseline.upsert(record_for(&cluster, "cls-old"));
        baseline.upsert(record_for(&svc, "svc-old"));

        let graph = ResourceGraph::from_nodes(vec![new_net, cluster, svc]);
        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());

        // net replaces on max_azs; cluster's vpc_id and svc's cluster_id are
        // immutable references, so both follow suit.
        assert_eq!(set.creates(), 3);
        assert_eq!(set.deletes(), 3);
        assert_eq!(set.updates(), 0);
        assert_eq!(set.unchanged(), 0);
    }

    #[test]
    fn replacement_re_points_mutable_references_with_an_update() {
        let old_net = node("net", "network.vpc", &[("max_azs", PropertyValue::Int(3))]);
        let new_net = node("net", "network.vpc", &[("max_azs", PropertyValue::Int(2))]);
        // subnet is not in container.service's immutable set.
        let svc = node("svc", "container.service", &[("subnet", reference("net"))]);

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old_net, "vpc-old"));
        baseline.upsert(record_for(&svc, "svc-1"));

        let graph = ResourceGraph::from_nodes(vec![new_net, svc]);
        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());

        assert_eq!(set.creates(), 1);
        assert_eq!(set.deletes(), 1);
        assert_eq!(set.updates(), 1);
        let svc_entry = set
            .entries
            .iter()
            .find(|e| e.logical_id == "svc")
            .expect("svc entry");
        assert_eq!(svc_entry.operation, OperationKind::Update);
        assert!(svc_entry.replace.is_none());
        assert!(svc_entry.reason.contains("subnet"));
    }

    #[test]
    fn in_place_update_of_a_dependency_does_not_cascade() {
        let old_net = node(
            "net",
            "network.vpc",
            &[("tags", PropertyValue::String(String::from("a")))],
        );
        let new_net = node(
            "net",
            "network.vpc",
            &[("tags", PropertyValue::String(String::from("b")))],
        );
        let cluster = node("cluster", "container.cluster", &[("vpc_id", reference("net"))]);

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(record_for(&old_net, "vpc-1"));
        baseline.upsert(record_for(&cluster, "cls-1"));

        let graph = ResourceGraph::from_nodes(vec![new_net, cluster]);
        let set = DiffEngine::new().diff(&graph, &baseline, &ResourceKindRegistry::default());

        // The vpc's provider id is stable across an in-place update, so the
        // consumer stays untouched.
        assert_eq!(set.updates(), 1);
        assert_eq!(set.unchanged(), 1);
        assert_eq!(set.creates(), 0);
    }

    #[test]
    fn removed_property_counts_as_change() {
        let old = node(
            "site",
            "storage.bucket",
            &[("versioned", PropertyValue::Bool(true))],
        );
        let new = node("site", "storage.bucket", &[]);
        assert_eq!(
            changed_properties(&old.properties, &new.properties),
            vec!["versioned"]
        );
    }
}
