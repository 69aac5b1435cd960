//! Resource graph construction.
//!
//! Converts a parsed stack document into a validated [`ResourceGraph`]:
//! property values are typed, `${logical_id.attribute}` references become
//! dependency edges, and the result is checked to be a DAG.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::document::{ResourceDecl, StackDocument};
use crate::error::{DocumentError, GraphError, Result, StackformError};

use super::model::{PropertyBag, PropertyValue, Reference, ResourceGraph, ResourceNode};

/// Builder for resource graphs.
///
/// Pure construction: no side effects, no provider calls.
#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds a resource graph from a stack document.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateId`] when two declarations share a
    /// logical id, [`GraphError::MalformedReference`] when a reference or
    /// explicit dependency points to an undeclared id, and
    /// [`GraphError::CyclicDependency`] when the edges form a cycle.
    pub fn build(&self, document: &StackDocument) -> Result<ResourceGraph> {
        let mut seen: HashSet<&str> = HashSet::new();
        for decl in &document.resources {
            if !seen.insert(decl.id.as_str()) {
                return Err(StackformError::Graph(GraphError::DuplicateId {
                    id: decl.id.clone(),
                }));
            }
        }

        let declared: HashSet<&str> = document.resources.iter().map(|r| r.id.as_str()).collect();

        let mut nodes = Vec::with_capacity(document.resources.len());
        for decl in &document.resources {
            nodes.push(Self::build_node(decl, &declared)?);
        }

        Self::check_acyclic(&nodes)?;

        debug!("Built resource graph with {} nodes", nodes.len());
        Ok(ResourceGraph::from_nodes(nodes))
    }

    /// Builds a single node, inferring dependency edges from references.
    fn build_node(decl: &ResourceDecl, declared: &HashSet<&str>) -> Result<ResourceNode> {
        let mut properties = PropertyBag::new();
        for (name, raw) in &decl.properties {
            let value = convert_value(raw).map_err(|message| {
                StackformError::Document(DocumentError::validation(
                    message,
                    format!("{}.properties.{name}", decl.id),
                ))
            })?;
            properties.insert(name.clone(), value);
        }

        // Explicit dependencies first, then inferred, first-seen order.
        let mut depends_on: Vec<String> = Vec::new();
        for dep in &decl.depends_on {
            if !declared.contains(dep.as_str()) {
                return Err(StackformError::Graph(GraphError::MalformedReference {
                    resource: decl.id.clone(),
                    target: dep.clone(),
                }));
            }
            if !depends_on.contains(dep) {
                depends_on.push(dep.clone());
            }
        }

        let mut refs = Vec::new();
        for value in properties.values() {
            value.collect_references(&mut refs);
        }
        for reference in refs {
            if !declared.contains(reference.resource.as_str()) {
                return Err(StackformError::Graph(GraphError::MalformedReference {
                    resource: decl.id.clone(),
                    target: reference.resource.clone(),
                }));
            }
            if !depends_on.contains(&reference.resource) {
                depends_on.push(reference.resource.clone());
            }
        }

        Ok(ResourceNode {
            id: decl.id.clone(),
            kind: decl.kind.clone(),
            properties,
            depends_on,
        })
    }

    /// Kahn's algorithm; any node left unvisited after a complete pass sits
    /// on a cycle.
    fn check_acyclic(nodes: &[ResourceNode]) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> =
            nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for node in nodes {
            for dep in &node.depends_on {
                if dep == &node.id {
                    return Err(StackformError::Graph(GraphError::CyclicDependency {
                        cycle: format!("{} -> {}", node.id, node.id),
                    }));
                }
            }
        }
        for node in nodes {
            if let Some(degree) = in_degree.get_mut(node.id.as_str()) {
                *degree += node.depends_on.len();
            }
        }

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop() {
            visited += 1;
            for node in nodes {
                if node.depends_on.iter().any(|d| d == id)
                    && let Some(degree) = in_degree.get_mut(node.id.as_str())
                {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(node.id.as_str());
                    }
                }
            }
        }

        if visited < nodes.len() {
            let remaining: Vec<&str> = nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| in_degree.get(id).is_some_and(|&d| d > 0))
                .collect();
            return Err(StackformError::Graph(GraphError::CyclicDependency {
                cycle: remaining.join(" -> "),
            }));
        }

        Ok(())
    }
}

/// Converts a raw YAML property value into a typed [`PropertyValue`].
///
/// A string consisting entirely of `${logical_id.attribute}` becomes a
/// reference; anything else stays a literal.
fn convert_value(raw: &serde_yaml::Value) -> std::result::Result<PropertyValue, String> {
    match raw {
        serde_yaml::Value::String(s) => Ok(parse_reference(s)
            .map_or_else(|| PropertyValue::String(s.clone()), PropertyValue::Ref)),
        serde_yaml::Value::Bool(b) => Ok(PropertyValue::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(PropertyValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(PropertyValue::Float(f))
            } else {
                Err(format!("Unsupported numeric value: {n}"))
            }
        }
        serde_yaml::Value::Sequence(items) => {
            let converted: std::result::Result<Vec<_>, _> =
                items.iter().map(convert_value).collect();
            Ok(PropertyValue::List(converted?))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut converted = BTreeMap::new();
            for (key, value) in map {
                let key = key
                    .as_str()
                    .ok_or_else(|| String::from("Property map keys must be strings"))?;
                converted.insert(key.to_string(), convert_value(value)?);
            }
            Ok(PropertyValue::Map(converted))
        }
        serde_yaml::Value::Null => Err(String::from("Property values must not be null")),
        serde_yaml::Value::Tagged(_) => Err(String::from("YAML tags are not supported")),
    }
}

/// Parses a whole-string `${logical_id.attribute}` reference.
fn parse_reference(s: &str) -> Option<Reference> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    let (resource, attribute) = inner.split_once('.')?;
    if resource.is_empty() || attribute.is_empty() || inner.contains(|c: char| c.is_whitespace()) {
        return None;
    }
    Some(Reference {
        resource: resource.to_string(),
        attribute: attribute.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentParser;

    fn parse(yaml: &str) -> StackDocument {
        DocumentParser::new()
            .parse_yaml(yaml, None)
            .expect("document should parse")
    }

    #[test]
    fn builds_graph_with_inferred_edges() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: net
    kind: network.vpc
  - id: cluster
    kind: container.cluster
    properties:
      vpc_id: ${net.id}
",
        );
        let graph = GraphBuilder::new().build(&doc).expect("should build");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependencies_of("cluster"), ["net"]);
        assert_eq!(graph.get("cluster").expect("node").references().len(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: net
    kind: network.vpc
  - id: net
    kind: network.vpc
",
        );
        let err = GraphBuilder::new().build(&doc).expect_err("should fail");
        assert!(matches!(
            err,
            StackformError::Graph(GraphError::DuplicateId { .. })
        ));
    }

    #[test]
    fn dangling_reference_is_malformed() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: svc
    kind: container.service
    properties:
      cluster_id: ${cluster.id}
",
        );
        let err = GraphBuilder::new().build(&doc).expect_err("should fail");
        assert!(matches!(
            err,
            StackformError::Graph(GraphError::MalformedReference { .. })
        ));
    }

    #[test]
    fn dangling_explicit_dependency_is_malformed() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: svc
    kind: container.service
    depends_on: [cluster]
",
        );
        let err = GraphBuilder::new().build(&doc).expect_err("should fail");
        assert!(matches!(
            err,
            StackformError::Graph(GraphError::MalformedReference { .. })
        ));
    }

    #[test]
    fn mutual_references_form_a_cycle() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: a
    kind: network.vpc
    properties:
      peer: ${b.id}
  - id: b
    kind: network.vpc
    properties:
      peer: ${a.id}
",
        );
        let err = GraphBuilder::new().build(&doc).expect_err("should fail");
        assert!(matches!(
            err,
            StackformError::Graph(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let doc = parse(
            r"
stack:
  name: demo
resources:
  - id: a
    kind: network.vpc
    depends_on: [a]
",
        );
        let err = GraphBuilder::new().build(&doc).expect_err("should fail");
        assert!(matches!(
            err,
            StackformError::Graph(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn non_reference_strings_stay_literal() {
        assert!(parse_reference("plain").is_none());
        assert!(parse_reference("${noattr}").is_none());
        assert!(parse_reference("${a.b} trailing").is_none());
        let reference = parse_reference("${net.id}").expect("should parse");
        assert_eq!(reference.resource, "net");
        assert_eq!(reference.attribute, "id");
    }
}
