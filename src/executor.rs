//! Apply executor: runs an execution plan against a provider.
//!
//! Ops run on a bounded worker pool. An op is dispatched only once every
//! one of its scheduling constraints has reached a terminal state; if a
//! constraint failed (or was itself skipped), the op is skipped without
//! ever invoking the provider. References are resolved from the snapshot
//! at dispatch time, and every completed op is recorded to state before
//! the run moves on.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result, StackformError};
use crate::graph::{PropertyBag, PropertyValue, ResourceGraph};
use crate::planner::{ExecutionPlan, OperationKind, ReplaceRole};
use crate::provider::{Provider, ResolvedBag};
use crate::registry::{ReplaceStrategy, ResourceKindRegistry};
use crate::state::{ResourceRecord, StateChange, StateRecorder, StateSnapshot};

/// Default number of concurrent provider operations.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Shared cancellation flag.
///
/// Cancelling stops new dispatches; in-flight operations run to completion
/// so their results still land in state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a new, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of a single op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// The provider operation completed (or nothing was needed).
    Succeeded,
    /// The provider operation failed.
    Failed(String),
    /// The op was never attempted.
    Skipped(String),
}

/// Result for one op, in plan order.
#[derive(Debug, Clone)]
pub struct OpResult {
    /// Logical id of the resource.
    pub logical_id: String,
    /// The operation that was (or was not) performed.
    pub operation: OperationKind,
    /// Terminal outcome.
    pub outcome: OpOutcome,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every op succeeded.
    Succeeded,
    /// Some ops succeeded, some failed or were skipped. State reflects the
    /// completed ops; a re-run picks up the remainder.
    PartialFailure,
    /// No actionable op completed.
    Failed,
}

/// Report for a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Per-op results, in plan order.
    pub results: Vec<OpResult>,
    /// Overall status.
    pub status: RunStatus,
}

impl RunReport {
    fn from_results(results: Vec<OpResult>) -> Self {
        let actionable = results
            .iter()
            .filter(|r| r.operation != OperationKind::NoOp);
        let mut succeeded = 0usize;
        let mut not_succeeded = 0usize;
        for result in actionable {
            match result.outcome {
                OpOutcome::Succeeded => succeeded += 1,
                OpOutcome::Failed(_) | OpOutcome::Skipped(_) => not_succeeded += 1,
            }
        }

        let status = if not_succeeded == 0 {
            RunStatus::Succeeded
        } else if succeeded > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Failed
        };

        Self { results, status }
    }

    /// Returns true if every op succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Logical ids of ops with the given outcome shape.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, OpOutcome::Failed(_)))
            .map(|r| r.logical_id.as_str())
            .collect()
    }

    /// First failure message, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| match &r.outcome {
            OpOutcome::Failed(message) => Some(message.as_str()),
            _ => None,
        })
    }
}

/// Per-op progress inside the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Everything a worker needs, captured at dispatch time.
struct OpWork {
    operation: OperationKind,
    logical_id: String,
    kind: String,
    provider_id: Option<String>,
    resolved: ResolvedBag,
    declared: PropertyBag,
    new_hash: String,
    dependencies: Vec<String>,
    baseline: Option<ResourceRecord>,
    /// Whether a successful delete removes the state record. The delete
    /// half of a create-before-delete replacement must not erase the
    /// record its create half just wrote.
    remove_record: bool,
}

/// Executes execution plans with bounded concurrency.
pub struct ApplyExecutor {
    provider: Arc<dyn Provider>,
    concurrency: usize,
    cancel: CancelFlag,
}

impl ApplyExecutor {
    /// Creates an executor over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancelFlag::new(),
        }
    }

    /// Sets the worker pool size (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Uses an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation flag for this executor.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs the plan to completion, recording every result to state.
    ///
    /// # Errors
    ///
    /// Returns an error only for run-level faults (state persistence,
    /// worker pool). Individual op failures are reported in the
    /// [`RunReport`], not as errors.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        graph: &ResourceGraph,
        registry: &ResourceKindRegistry,
        recorder: &mut StateRecorder<'_>,
    ) -> Result<RunReport> {
        let n = plan.ops.len();
        info!(
            "Executing plan: {} ops ({} actionable), concurrency {}",
            n,
            plan.actionable_count(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut slots = vec![Slot::Pending; n];
        let mut outcomes: Vec<Option<OpOutcome>> = vec![None; n];
        let mut tasks: JoinSet<(usize, Result<StateChange>)> = JoinSet::new();

        loop {
            // Dispatch until no pending op can make progress.
            let mut progressed = true;
            while progressed {
                progressed = false;
                for i in 0..n {
                    if slots[i] != Slot::Pending {
                        continue;
                    }
                    let op = &plan.ops[i];

                    if let Some(&blocked_on) = op
                        .dependencies
                        .iter()
                        .find(|&&d| slots[d] == Slot::Failed)
                    {
                        let cause = format!(
                            "'{}' did not complete",
                            plan.ops[blocked_on].entry.logical_id
                        );
                        warn!("Skipping '{}': {cause}", op.entry.logical_id);
                        outcomes[i] = Some(OpOutcome::Skipped(cause));
                        slots[i] = Slot::Failed;
                        progressed = true;
                        continue;
                    }
                    if op
                        .dependencies
                        .iter()
                        .any(|&d| slots[d] != Slot::Succeeded)
                    {
                        continue;
                    }

                    if op.entry.operation == OperationKind::NoOp {
                        outcomes[i] = Some(OpOutcome::Succeeded);
                        slots[i] = Slot::Succeeded;
                        progressed = true;
                        continue;
                    }
                    if self.cancel.is_cancelled() {
                        outcomes[i] =
                            Some(OpOutcome::Skipped(String::from("run cancelled")));
                        slots[i] = Slot::Failed;
                        progressed = true;
                        continue;
                    }

                    match Self::prepare(op, graph, registry, recorder.snapshot()) {
                        Ok(work) => {
                            debug!(
                                "Dispatching {} '{}'",
                                op.entry.operation, op.entry.logical_id
                            );
                            slots[i] = Slot::Running;
                            let provider = Arc::clone(&self.provider);
                            let semaphore = Arc::clone(&semaphore);
                            tasks.spawn(async move {
                                (i, run_op(provider, semaphore, work).await)
                            });
                        }
                        Err(e) => {
                            warn!("Cannot dispatch '{}': {e}", op.entry.logical_id);
                            outcomes[i] = Some(OpOutcome::Failed(e.to_string()));
                            slots[i] = Slot::Failed;
                            progressed = true;
                        }
                    }
                }
            }

            if tasks.is_empty() {
                if slots.iter().any(|&s| s == Slot::Pending) {
                    return Err(StackformError::internal(
                        "execution stalled with unsatisfiable constraints",
                    ));
                }
                break;
            }

            match tasks.join_next().await {
                Some(Ok((i, result))) => match result {
                    Ok(change) => {
                        recorder.record(change).await?;
                        debug!("Completed '{}'", plan.ops[i].entry.logical_id);
                        outcomes[i] = Some(OpOutcome::Succeeded);
                        slots[i] = Slot::Succeeded;
                    }
                    Err(e) => {
                        warn!("Op '{}' failed: {e}", plan.ops[i].entry.logical_id);
                        outcomes[i] = Some(OpOutcome::Failed(e.to_string()));
                        slots[i] = Slot::Failed;
                    }
                },
                Some(Err(e)) => {
                    return Err(StackformError::internal(format!(
                        "worker task failed: {e}"
                    )));
                }
                None => break,
            }
        }

        let results = plan
            .ops
            .iter()
            .zip(outcomes)
            .map(|(op, outcome)| OpResult {
                logical_id: op.entry.logical_id.clone(),
                operation: op.entry.operation,
                outcome: outcome.unwrap_or_else(|| {
                    OpOutcome::Skipped(String::from("never reached"))
                }),
            })
            .collect();

        let report = RunReport::from_results(results);
        info!("Run finished: {:?}", report.status);
        Ok(report)
    }

    /// Captures everything a worker needs, resolving references from the
    /// current snapshot. All constraints are terminal by now, so every
    /// referenced output is already recorded (or genuinely missing).
    fn prepare(
        op: &crate::planner::ScheduledOp,
        graph: &ResourceGraph,
        registry: &ResourceKindRegistry,
        snapshot: &StateSnapshot,
    ) -> Result<OpWork> {
        let entry = &op.entry;
        let declared = entry.new.clone().unwrap_or_default();
        let resolved = if entry.operation == OperationKind::Delete {
            ResolvedBag::new()
        } else {
            resolve_bag(&declared, snapshot)?
        };

        let remove_record = !(entry.replace == Some(ReplaceRole::DeleteHalf)
            && registry.replace_strategy(&entry.kind) == ReplaceStrategy::CreateBeforeDelete);

        Ok(OpWork {
            operation: entry.operation,
            logical_id: entry.logical_id.clone(),
            kind: entry.kind.clone(),
            provider_id: entry.provider_id.clone(),
            resolved,
            declared,
            new_hash: entry.new_hash.clone().unwrap_or_default(),
            dependencies: graph.dependencies_of(&entry.logical_id).to_vec(),
            baseline: snapshot.get(&entry.logical_id).cloned(),
            remove_record,
        })
    }
}

/// Runs a single op on the worker pool.
async fn run_op(
    provider: Arc<dyn Provider>,
    semaphore: Arc<Semaphore>,
    work: OpWork,
) -> Result<StateChange> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| StackformError::internal("worker pool closed"))?;

    match work.operation {
        OperationKind::Create => {
            let created = provider.create(&work.kind, &work.resolved).await?;
            let record = ResourceRecord::new(
                &work.logical_id,
                &created.provider_id,
                &work.kind,
                work.declared,
                &work.new_hash,
            )
            .with_dependencies(work.dependencies)
            .with_outputs(created.outputs);
            Ok(StateChange::Upsert(record))
        }
        OperationKind::Update => {
            let provider_id = work.provider_id.as_deref().ok_or_else(|| {
                StackformError::internal("update entry without a provider id")
            })?;
            let outputs = provider
                .update(&work.kind, provider_id, &work.resolved)
                .await?;
            let mut record = work.baseline.ok_or_else(|| {
                StackformError::internal("update entry without a baseline record")
            })?;
            record.properties = work.declared;
            record.property_hash = work.new_hash;
            record.outputs = outputs;
            record.dependencies = work.dependencies;
            record.updated_at = Utc::now();
            Ok(StateChange::Upsert(record))
        }
        OperationKind::Delete => {
            let provider_id = work.provider_id.as_deref().ok_or_else(|| {
                StackformError::internal("delete entry without a provider id")
            })?;
            match provider.delete(&work.kind, provider_id).await {
                Ok(()) => {}
                // Already gone: the desired end state holds.
                Err(StackformError::Provider(ProviderError::NotFound { .. })) => {
                    debug!("'{}' was already deleted on the provider", work.logical_id);
                }
                Err(e) => return Err(e),
            }
            if work.remove_record {
                Ok(StateChange::Remove(work.logical_id))
            } else {
                Ok(StateChange::None)
            }
        }
        OperationKind::NoOp => Ok(StateChange::None),
    }
}

/// Resolves a declared property bag into plain JSON, replacing each
/// reference with the target's recorded output attribute.
fn resolve_bag(bag: &PropertyBag, snapshot: &StateSnapshot) -> Result<ResolvedBag> {
    let mut resolved = ResolvedBag::new();
    for (name, value) in bag {
        resolved.insert(name.clone(), resolve_value(value, snapshot)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &PropertyValue, snapshot: &StateSnapshot) -> Result<serde_json::Value> {
    match value {
        PropertyValue::String(s) => Ok(serde_json::Value::String(s.clone())),
        PropertyValue::Int(i) => Ok(serde_json::Value::from(*i)),
        PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| StackformError::internal("non-finite float property")),
        PropertyValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        PropertyValue::List(items) => Ok(serde_json::Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, snapshot))
                .collect::<Result<_>>()?,
        )),
        PropertyValue::Map(map) => {
            let mut object = serde_json::Map::new();
            for (key, nested) in map {
                object.insert(key.clone(), resolve_value(nested, snapshot)?);
            }
            Ok(serde_json::Value::Object(object))
        }
        PropertyValue::Ref(reference) => snapshot
            .get(&reference.resource)
            .and_then(|record| record.output(&reference.attribute))
            .ok_or_else(|| {
                StackformError::Provider(ProviderError::MissingOutput {
                    resource: reference.resource.clone(),
                    attribute: reference.attribute.clone(),
                })
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentParser;
    use crate::graph::GraphBuilder;
    use crate::planner::{DiffEngine, Scheduler};
    use crate::provider::{CreatedResource, MockProvider};
    use crate::state::{LocalStateStore, OutputMap, StateStore};
    use tempfile::TempDir;

    fn graph_from(yaml: &str) -> ResourceGraph {
        let doc = DocumentParser::new().parse_yaml(yaml, None).expect("parse");
        GraphBuilder::new().build(&doc).expect("build")
    }

    fn three_tier() -> ResourceGraph {
        graph_from(
            r"
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
",
        )
    }

    fn plan_for(graph: &ResourceGraph, baseline: &StateSnapshot) -> ExecutionPlan {
        let registry = ResourceKindRegistry::default();
        let set = DiffEngine::new().diff(graph, baseline, &registry);
        Scheduler::new()
            .schedule(set, graph, baseline, &registry)
            .expect("schedule")
    }

    async fn run(
        provider: MockProvider,
        graph: &ResourceGraph,
        baseline: StateSnapshot,
        store: &LocalStateStore,
    ) -> (RunReport, StateSnapshot) {
        let plan = plan_for(graph, &baseline);
        let mut recorder = StateRecorder::new(baseline, store);
        let executor = ApplyExecutor::new(Arc::new(provider));
        let report = executor
            .execute(&plan, graph, &ResourceKindRegistry::default(), &mut recorder)
            .await
            .expect("execute");
        (report, recorder.into_snapshot())
    }

    #[tokio::test]
    async fn first_apply_creates_everything() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let graph = three_tier();

        let mut provider = MockProvider::new();
        provider.expect_create().times(5).returning(|kind, _| {
            Ok(CreatedResource {
                provider_id: format!("{kind}-1"),
                outputs: OutputMap::new(),
            })
        });

        let (report, snapshot) =
            run(provider, &graph, StateSnapshot::new("demo", "dev"), &store).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        for id in ["site", "net", "cluster", "svc", "db"] {
            assert!(snapshot.contains(id), "missing record for {id}");
        }
        // Persisted snapshot matches the in-memory one.
        let persisted = store.load().await.expect("load").expect("exists");
        assert_eq!(persisted.resources.len(), 5);
    }

    #[tokio::test]
    async fn failure_skips_dependents_without_calling_provider() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let graph = three_tier();

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .withf(|kind, _| kind == "network.vpc")
            .times(1)
            .returning(|_, _| {
                Err(StackformError::Provider(ProviderError::operation(
                    500, "boom",
                )))
            });
        provider
            .expect_create()
            .withf(|kind, _| kind == "storage.bucket")
            .times(1)
            .returning(|_, _| {
                Ok(CreatedResource {
                    provider_id: String::from("bkt-1"),
                    outputs: OutputMap::new(),
                })
            });
        // Dependents of the failed vpc must never reach the provider.
        provider
            .expect_create()
            .withf(|kind, _| {
                kind == "container.cluster"
                    || kind == "container.service"
                    || kind == "database.instance"
            })
            .times(0);

        let (report, snapshot) =
            run(provider, &graph, StateSnapshot::new("demo", "dev"), &store).await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(report.failed_ids(), vec!["net"]);
        assert!(snapshot.contains("site"));
        assert!(!snapshot.contains("net"));

        let skipped: Vec<&str> = report
            .results
            .iter()
            .filter(|r| matches!(r.outcome, OpOutcome::Skipped(_)))
            .map(|r| r.logical_id.as_str())
            .collect();
        assert_eq!(skipped.len(), 3);
        assert!(skipped.contains(&"cluster"));
        assert!(skipped.contains(&"svc"));
        assert!(skipped.contains(&"db"));
    }

    #[tokio::test]
    async fn references_resolve_from_recorded_outputs() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let graph = graph_from(
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
      subnet: ${net.subnet_id}
",
        );

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .withf(|kind, _| kind == "network.vpc")
            .times(1)
            .returning(|_, _| {
                Ok(CreatedResource {
                    provider_id: String::from("vpc-123"),
                    outputs: [(String::from("subnet_id"), serde_json::json!("sub-9"))]
                        .into_iter()
                        .collect(),
                })
            });
        provider
            .expect_create()
            .withf(|kind, properties| {
                kind == "container.cluster"
                    && properties.get("vpc_id") == Some(&serde_json::json!("vpc-123"))
                    && properties.get("subnet") == Some(&serde_json::json!("sub-9"))
            })
            .times(1)
            .returning(|_, _| {
                Ok(CreatedResource {
                    provider_id: String::from("cls-1"),
                    outputs: OutputMap::new(),
                })
            });

        let (report, _) =
            run(provider, &graph, StateSnapshot::new("demo", "dev"), &store).await;
        assert_eq!(report.status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn missing_output_fails_the_consumer_only() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let graph = graph_from(
            r"
stack:
  name: demo
resources:
  - id: net
    kind: network.vpc
  - id: cluster
    kind: container.cluster
    properties:
      subnet: ${net.subnet_id}
",
        );

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .withf(|kind, _| kind == "network.vpc")
            .times(1)
            .returning(|_, _| {
                Ok(CreatedResource {
                    provider_id: String::from("vpc-123"),
                    outputs: OutputMap::new(),
                })
            });
        provider
            .expect_create()
            .withf(|kind, _| kind == "container.cluster")
            .times(0);

        let (report, snapshot) =
            run(provider, &graph, StateSnapshot::new("demo", "dev"), &store).await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(report.failed_ids(), vec!["cluster"]);
        assert!(
            report
                .first_error()
                .is_some_and(|m| m.contains("subnet_id"))
        );
        assert!(snapshot.contains("net"));
        assert!(!snapshot.contains("cluster"));
    }

    #[tokio::test]
    async fn delete_of_already_gone_resource_succeeds() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(ResourceRecord::new(
            "old",
            "vpc-gone",
            "network.vpc",
            PropertyBag::new(),
            "h",
        ));

        let mut provider = MockProvider::new();
        provider
            .expect_delete()
            .withf(|_, provider_id| provider_id == "vpc-gone")
            .times(1)
            .returning(|_, provider_id| {
                Err(StackformError::Provider(ProviderError::NotFound {
                    provider_id: provider_id.to_string(),
                }))
            });

        let (report, snapshot) = run(provider, &ResourceGraph::empty(), baseline, &store).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(!snapshot.contains("old"));
    }

    #[tokio::test]
    async fn cancellation_skips_everything_not_started() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let graph = three_tier();
        let baseline = StateSnapshot::new("demo", "dev");

        // No expectations: any provider call panics the test.
        let provider = MockProvider::new();
        let plan = plan_for(&graph, &baseline);
        let mut recorder = StateRecorder::new(baseline, &store);
        let executor = ApplyExecutor::new(Arc::new(provider));
        executor.cancel_flag().cancel();

        let report = executor
            .execute(&plan, &graph, &ResourceKindRegistry::default(), &mut recorder)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report
            .results
            .iter()
            .all(|r| matches!(r.outcome, OpOutcome::Skipped(_))));
    }

    #[tokio::test]
    async fn create_before_delete_replacement_keeps_new_record() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        // max_azs is immutable for network.vpc, and the kind replaces
        // create-first.
        let graph = graph_from(
            r"
stack:
  name: demo
resources:
  - id: net
    kind: network.vpc
    properties:
      max_azs: 2
",
        );

        let mut baseline = StateSnapshot::new("demo", "dev");
        baseline.upsert(ResourceRecord::new(
            "net",
            "vpc-old",
            "network.vpc",
            [(String::from("max_azs"), PropertyValue::Int(3))]
                .into_iter()
                .collect(),
            "stale-hash",
        ));

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .times(1)
            .returning(|_, _| {
                Ok(CreatedResource {
                    provider_id: String::from("vpc-new"),
                    outputs: OutputMap::new(),
                })
            });
        provider
            .expect_delete()
            .withf(|_, provider_id| provider_id == "vpc-old")
            .times(1)
            .returning(|_, _| Ok(()));

        let (report, snapshot) = run(provider, &graph, baseline, &store).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        let record = snapshot.get("net").expect("record survives replacement");
        assert_eq!(record.provider_id, "vpc-new");
    }
}
