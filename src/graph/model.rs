//! Typed resource nodes and the resource graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A property bag: named, typed property values.
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// A reference to another resource's output attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Logical id of the referenced resource.
    pub resource: String,
    /// Output attribute name on the referenced resource.
    pub attribute: String,
}

/// A typed property value.
///
/// References compare by target identity (id + attribute), not by resolved
/// value; resolution happens at apply time from the dependency's recorded
/// outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum PropertyValue {
    /// A string literal.
    String(String),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A boolean literal.
    Bool(bool),
    /// A list of values.
    List(Vec<PropertyValue>),
    /// A nested map of values.
    Map(BTreeMap<String, PropertyValue>),
    /// A reference to another resource's output attribute.
    Ref(Reference),
}

/// A single resource node in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceNode {
    /// Stack-unique logical id.
    pub id: String,
    /// Resource kind tag.
    pub kind: String,
    /// Property bag (literals and references).
    pub properties: PropertyBag,
    /// Dependency edges: explicit `depends_on` plus edges inferred from
    /// references, deduplicated, in first-seen order.
    pub depends_on: Vec<String>,
}

/// The desired resource graph: all nodes, in declaration order.
///
/// Owns its nodes; immutable after construction within a single run.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
    /// Logical id -> index into `nodes`.
    index: HashMap<String, usize>,
}

impl PropertyValue {
    /// Collects every reference contained in this value, depth first.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Ref(reference) => out.push(reference),
            Self::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
            Self::String(_) | Self::Int(_) | Self::Float(_) | Self::Bool(_) => {}
        }
    }

    /// Returns true if the value contains no references.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs.is_empty()
    }
}

impl ResourceNode {
    /// Returns all references contained in this node's property bag.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            value.collect_references(&mut refs);
        }
        refs
    }
}

impl ResourceGraph {
    /// Builds a graph from already-validated nodes.
    ///
    /// Callers go through [`super::GraphBuilder`]; this constructor assumes
    /// ids are unique and edges resolve.
    #[must_use]
    pub(crate) fn from_nodes(nodes: Vec<ResourceNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self { nodes, index }
    }

    /// Creates an empty graph (used as the desired state when destroying).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the node with the given logical id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Returns true if a node with the given id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All nodes, in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependency ids of the given node (empty when the id is unknown).
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.get(id).map_or(&[], |n| &n.depends_on)
    }

    /// Logical ids of nodes that depend on the given id, in declaration order.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.iter().any(|d| d == id))
            .map(|n| n.id.as_str())
            .collect()
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.attribute)
    }
}
