//! Dependency scheduler for change sets.
//!
//! Orders change-set entries so that creates and updates run in dependency
//! order (producers first), deletes run in reverse dependency order
//! (consumers first), and Replace pairs respect their kind's strategy.
//! Each scheduled op carries the indices of the ops that must reach a
//! terminal state before it may start, which is what the executor's worker
//! pool gates on.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::{PlanError, Result, StackformError};
use crate::graph::ResourceGraph;
use crate::registry::{ReplaceStrategy, ResourceKindRegistry};
use crate::state::StateSnapshot;

use super::diff::{ChangeEntry, ChangeSet, OperationKind, ReplaceRole};

/// A change-set entry with its scheduling constraints resolved.
#[derive(Debug, Clone)]
pub struct ScheduledOp {
    /// The underlying change-set entry.
    pub entry: ChangeEntry,
    /// Indices of ops that must be terminal before this op starts.
    pub dependencies: Vec<usize>,
}

/// A dependency-ordered execution plan.
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Ops in a valid sequential order (indices in `dependencies` refer to
    /// positions in this list).
    pub ops: Vec<ScheduledOp>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

/// Scheduler for change sets.
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Creates a new scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Produces an execution plan for a change set.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::SchedulingConflict`] if no valid order exists.
    /// With an acyclic graph and consistent baseline edges this is
    /// unreachable; it guards against a cycle slipping through.
    pub fn schedule(
        &self,
        change_set: ChangeSet,
        graph: &ResourceGraph,
        baseline: &StateSnapshot,
        registry: &ResourceKindRegistry,
    ) -> Result<ExecutionPlan> {
        let entries = change_set.entries;
        let n = entries.len();

        // Per logical id: the forward entry (Create/Update/NoOp, including
        // the create half of a Replace) and the Delete entry.
        let mut forward_idx: HashMap<&str, usize> = HashMap::new();
        let mut delete_idx: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.operation == OperationKind::Delete {
                delete_idx.insert(entry.logical_id.as_str(), i);
            } else {
                forward_idx.insert(entry.logical_id.as_str(), i);
            }
        }

        let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

        for (i, entry) in entries.iter().enumerate() {
            match entry.operation {
                OperationKind::Create | OperationKind::Update | OperationKind::NoOp => {
                    // Producers before consumers.
                    for dep in graph.dependencies_of(&entry.logical_id) {
                        if let Some(&j) = forward_idx.get(dep.as_str())
                            && j != i
                        {
                            deps[i].insert(j);
                        }
                    }
                    // Delete-before-create replacement: the successor waits
                    // for the old instance to go away.
                    if entry.replace == Some(ReplaceRole::CreateHalf)
                        && registry.replace_strategy(&entry.kind)
                            == ReplaceStrategy::DeleteBeforeCreate
                        && let Some(&j) = delete_idx.get(entry.logical_id.as_str())
                    {
                        deps[i].insert(j);
                    }
                }
                OperationKind::Delete => {
                    // A resource is never deleted while something still
                    // depends on it: wait for each recorded dependent to be
                    // deleted or updated away.
                    for dependent in baseline.dependents_of(&entry.logical_id) {
                        if let Some(&j) = delete_idx.get(dependent) {
                            if j != i {
                                deps[i].insert(j);
                            }
                        } else if let Some(&j) = forward_idx.get(dependent)
                            && matches!(
                                entries[j].operation,
                                OperationKind::Update | OperationKind::Create
                            )
                        {
                            deps[i].insert(j);
                        }
                    }
                    // Create-before-delete replacement: the old instance
                    // outlives its successor's creation.
                    if entry.replace == Some(ReplaceRole::DeleteHalf)
                        && let Some(&j) = forward_idx.get(entry.logical_id.as_str())
                        && registry.replace_strategy(&entries[j].kind)
                            == ReplaceStrategy::CreateBeforeDelete
                    {
                        deps[i].insert(j);
                    }
                }
            }
        }

        let order = Self::topological_order(&entries, &deps)?;

        // Remap dependency indices to positions in the ordered list.
        let mut position = vec![0usize; n];
        for (new_pos, &old_idx) in order.iter().enumerate() {
            position[old_idx] = new_pos;
        }

        let mut ops: Vec<Option<ScheduledOp>> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut dependencies: Vec<usize> =
                    deps[i].iter().map(|&j| position[j]).collect();
                dependencies.sort_unstable();
                Some(ScheduledOp {
                    entry,
                    dependencies,
                })
            })
            .collect();

        let ordered = order
            .iter()
            .map(|&old_idx| {
                ops[old_idx]
                    .take()
                    .unwrap_or_else(|| unreachable!("each index appears once in the order"))
            })
            .collect();

        debug!("Scheduled {n} change-set entries");
        Ok(ExecutionPlan {
            ops: ordered,
            created_at: Utc::now(),
        })
    }

    /// Kahn's algorithm over entries, smallest index first for determinism.
    fn topological_order(
        entries: &[ChangeEntry],
        deps: &[BTreeSet<usize>],
    ) -> Result<Vec<usize>> {
        let n = entries.len();
        let mut in_degree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let next = (0..n).find(|&i| !placed[i] && in_degree[i] == 0);
            let Some(i) = next else {
                let stuck: Vec<&str> = (0..n)
                    .filter(|&i| !placed[i])
                    .map(|i| entries[i].logical_id.as_str())
                    .collect();
                return Err(StackformError::Plan(PlanError::SchedulingConflict {
                    message: format!("circular constraints among: {}", stuck.join(", ")),
                }));
            };

            placed[i] = true;
            order.push(i);
            for (j, dep_set) in deps.iter().enumerate() {
                if !placed[j] && dep_set.contains(&i) {
                    in_degree[j] -= 1;
                }
            }
        }

        Ok(order)
    }
}

impl ExecutionPlan {
    /// Number of ops, including NoOps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the plan has no ops at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of ops that require a provider operation.
    #[must_use]
    pub fn actionable_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.entry.operation != OperationKind::NoOp)
            .count()
    }

    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.actionable_count() == 0
    }

    /// Number of create ops.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(OperationKind::Create)
    }

    /// Number of update ops.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count(OperationKind::Update)
    }

    /// Number of delete ops.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.count(OperationKind::Delete)
    }

    /// Position of the op for a logical id and operation, if present.
    #[must_use]
    pub fn position_of(&self, logical_id: &str, operation: OperationKind) -> Option<usize> {
        self.ops
            .iter()
            .position(|op| op.entry.logical_id == logical_id && op.entry.operation == operation)
    }

    fn count(&self, operation: OperationKind) -> usize {
        self.ops
            .iter()
            .filter(|op| op.entry.operation == operation)
            .count()
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_converged() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Execution plan ({} actionable ops):", self.actionable_count())?;
        for (i, op) in self.ops.iter().enumerate() {
            if op.entry.operation == OperationKind::NoOp {
                continue;
            }
            writeln!(f, "  {i}. {}", op.entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentParser;
    use crate::graph::GraphBuilder;
    use crate::planner::DiffEngine;

    fn three_tier_graph() -> ResourceGraph {
        let yaml = r"
stack:
  name: demo
resources:
  - id: site
    kind: storage.bucket
  - id: net
    kind: network.vpc
  - id: cluster
    kind: container.cluster
    properties:
      vpc_id: ${net.id}
  - id: svc
    kind: container.service
    properties:
      cluster_id: ${cluster.id}
  - id: db
    kind: database.instance
    properties:
      vpc_id: ${net.id}
";
        let doc = DocumentParser::new()
            .parse_yaml(yaml, None)
            .expect("parse document");
        GraphBuilder::new().build(&doc).expect("build graph")
    }

    fn plan_for(graph: &ResourceGraph, baseline: &StateSnapshot) -> ExecutionPlan {
        let registry = ResourceKindRegistry::default();
        let set = DiffEngine::new().diff(graph, baseline, &registry);
        Scheduler::new()
            .schedule(set, graph, baseline, &registry)
            .expect("schedule")
    }

    #[test]
    fn first_run_creates_in_dependency_order() {
        let graph = three_tier_graph();
        let baseline = StateSnapshot::new("demo", "dev");
        let plan = plan_for(&graph, &baseline);

        assert_eq!(plan.create_count(), 5);
        let pos = |id: &str| {
            plan.position_of(id, OperationKind::Create)
                .expect("create op present")
        };
        assert!(pos("net") < pos("cluster"));
        assert!(pos("net") < pos("db"));
        assert!(pos("cluster") < pos("svc"));
    }

    #[test]
    fn deletes_run_in_reverse_dependency_order() {
        let graph = three_tier_graph();
        let empty = StateSnapshot::new("demo", "dev");
        let first = plan_for(&graph, &empty);

        // Simulate a fully-applied baseline, then destroy everything.
        let mut baseline = StateSnapshot::new("demo", "dev");
        for op in &first.ops {
            let entry = &op.entry;
            let record = crate::state::ResourceRecord::new(
                &entry.logical_id,
                &format!("prov-{}", entry.logical_id),
                &entry.kind,
                entry.new.clone().unwrap_or_default(),
                entry.new_hash.as_deref().unwrap_or(""),
            )
            .with_dependencies(graph.dependencies_of(&entry.logical_id).to_vec());
            baseline.upsert(record);
        }

        let plan = plan_for(&ResourceGraph::empty(), &baseline);
        assert_eq!(plan.delete_count(), 5);
        let pos = |id: &str| {
            plan.position_of(id, OperationKind::Delete)
                .expect("delete op present")
        };
        assert!(pos("svc") < pos("cluster"));
        assert!(pos("cluster") < pos("net"));
        assert!(pos("db") < pos("net"));
    }

    #[test]
    fn create_before_delete_replacement_orders_pair() {
        // container.cluster replaces create-first.
        let yaml = r"
stack:
  name: demo
resources:
  - id: net
    kind: network.vpc
    properties:
      max_azs: 2
  - id: cluster
    kind: container.cluster
    properties:
      vpc_id: ${net.id}
";
        let doc = DocumentParser::new().parse_yaml(yaml, None).expect("parse");
        let graph = GraphBuilder::new().build(&doc).expect("build");

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(crate::state::ResourceRecord::new(
            "net",
            "vpc-old",
            "network.vpc",
            [(
                String::from("max_azs"),
                crate::graph::PropertyValue::Int(3),
            )]
            .into_iter()
            .collect(),
            "stale-hash",
        ));
        // max_azs is immutable for network.vpc -> replace, create-first.
        let plan = plan_for(&graph, &baseline);

        let create = plan
            .position_of("net", OperationKind::Create)
            .expect("create half");
        let delete = plan
            .position_of("net", OperationKind::Delete)
            .expect("delete half");
        assert!(create < delete);
        // Delete half lists the create half as a constraint.
        assert!(plan.ops[delete].dependencies.contains(&create));
    }

    #[test]
    fn delete_before_create_replacement_orders_pair() {
        let yaml = r"
stack:
  name: demo
resources:
  - id: site
    kind: storage.bucket
    properties:
      name: new-name
";
        let doc = DocumentParser::new().parse_yaml(yaml, None).expect("parse");
        let graph = GraphBuilder::new().build(&doc).expect("build");

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(crate::state::ResourceRecord::new(
            "site",
            "bkt-old",
            "storage.bucket",
            [(
                String::from("name"),
                crate::graph::PropertyValue::String(String::from("old-name")),
            )]
            .into_iter()
            .collect(),
            "stale-hash",
        ));

        let plan = plan_for(&graph, &baseline);
        let create = plan
            .position_of("site", OperationKind::Create)
            .expect("create half");
        let delete = plan
            .position_of("site", OperationKind::Delete)
            .expect("delete half");
        assert!(delete < create);
        assert!(plan.ops[create].dependencies.contains(&delete));
    }

    #[test]
    fn second_run_is_all_noop() {
        let graph = three_tier_graph();
        let mut baseline = StateSnapshot::new("demo", "dev");
        let hasher = crate::document::PropertyHasher::new();
        for node in graph.nodes() {
            baseline.upsert(
                crate::state::ResourceRecord::new(
                    &node.id,
                    &format!("prov-{}", node.id),
                    &node.kind,
                    node.properties.clone(),
                    &hasher.hash_resource(&node.kind, &node.properties),
                )
                .with_dependencies(node.depends_on.clone()),
            );
        }

        let plan = plan_for(&graph, &baseline);
        assert!(plan.is_converged());
        assert_eq!(plan.actionable_count(), 0);
    }

    #[test]
    fn manufactured_cycle_is_a_scheduling_conflict() {
        use crate::planner::ChangeEntry;

        // Two deletes whose baseline edges point at each other; the graph
        // layer would normally reject this.
        let graph = ResourceGraph::empty();
        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(
            crate::state::ResourceRecord::new(
                "a",
                "p-a",
                "network.vpc",
                crate::graph::PropertyBag::new(),
                "h",
            )
            .with_dependencies(vec![String::from("b")]),
        );
        baseline.upsert(
            crate::state::ResourceRecord::new(
                "b",
                "p-b",
                "network.vpc",
                crate::graph::PropertyBag::new(),
                "h",
            )
            .with_dependencies(vec![String::from("a")]),
        );

        let entries = vec!["a", "b"]
            .into_iter()
            .map(|id| ChangeEntry {
                logical_id: id.to_string(),
                kind: String::from("network.vpc"),
                operation: OperationKind::Delete,
                old: None,
                new: None,
                provider_id: Some(format!("p-{id}")),
                new_hash: None,
                replace: None,
                reason: String::new(),
            })
            .collect();

        let result = Scheduler::new().schedule(
            ChangeSet { entries },
            &graph,
            &baseline,
            &ResourceKindRegistry::default(),
        );
        assert!(matches!(
            result,
            Err(StackformError::Plan(PlanError::SchedulingConflict { .. }))
        ));
    }
}
