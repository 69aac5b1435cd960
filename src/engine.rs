//! Run orchestration: ties the document, planner, provider, and state
//! store together into plan, apply, and destroy runs.
//!
//! A run holds the state lock from before the baseline is loaded until the
//! final history entry is persisted. Apply converges toward the declared
//! graph; destroy is the same machinery with an empty desired graph.

use std::sync::Arc;
use tracing::info;

use crate::document::StackDocument;
use crate::error::Result;
use crate::executor::{ApplyExecutor, CancelFlag, RunReport, DEFAULT_CONCURRENCY};
use crate::graph::{GraphBuilder, ResourceGraph};
use crate::planner::{DiffEngine, ExecutionPlan, OperationKind, Scheduler};
use crate::provider::Provider;
use crate::registry::ResourceKindRegistry;
use crate::state::{
    LocalStateStore, RunHistoryEntry, RunOperation, StateRecorder, StateSnapshot, StateStore,
};

/// The provisioning engine for one stack document.
pub struct Engine {
    document: StackDocument,
    registry: ResourceKindRegistry,
    provider: Arc<dyn Provider>,
    store: Box<dyn StateStore>,
    concurrency: usize,
    cancel: CancelFlag,
}

impl Engine {
    /// Creates an engine over explicit collaborators.
    #[must_use]
    pub fn new(
        document: StackDocument,
        provider: Arc<dyn Provider>,
        store: Box<dyn StateStore>,
    ) -> Self {
        Self {
            document,
            registry: ResourceKindRegistry::default(),
            provider,
            store,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancelFlag::new(),
        }
    }

    /// Replaces the kind registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ResourceKindRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the worker pool size for apply and destroy.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The cancellation flag shared with the executor.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The stack document this engine runs.
    #[must_use]
    pub const fn document(&self) -> &StackDocument {
        &self.document
    }

    /// Builds the state store configured in a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the default state directory cannot be resolved.
    pub fn store_for(document: &StackDocument) -> Result<Box<dyn StateStore>> {
        let store = match &document.state.path {
            Some(path) => LocalStateStore::with_state_path(path),
            None => LocalStateStore::new()?,
        };
        Ok(Box::new(store))
    }

    /// Computes the execution plan for converging toward the document.
    ///
    /// Read-only: takes no lock and performs no provider operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is invalid, the baseline cannot be
    /// loaded, or no valid execution order exists.
    pub async fn plan(&self) -> Result<ExecutionPlan> {
        let graph = GraphBuilder::new().build(&self.document)?;
        self.plan_against(&graph).await
    }

    /// Computes the execution plan for tearing everything down.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Engine::plan`].
    pub async fn plan_destroy(&self) -> Result<ExecutionPlan> {
        self.plan_against(&ResourceGraph::empty()).await
    }

    /// Converges remote state toward the declared graph.
    ///
    /// # Errors
    ///
    /// Returns an error for run-level faults (lock, state, scheduling).
    /// Individual op failures are reported in the [`RunReport`].
    pub async fn apply(&self) -> Result<RunReport> {
        let graph = GraphBuilder::new().build(&self.document)?;
        info!(
            "Applying stack '{}' ({} resources declared)",
            self.document.stack.name,
            graph.len()
        );
        self.run(&graph, RunOperation::Apply).await
    }

    /// Deletes every resource recorded in state.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Engine::apply`].
    pub async fn destroy(&self) -> Result<RunReport> {
        info!("Destroying stack '{}'", self.document.stack.name);
        self.run(&ResourceGraph::empty(), RunOperation::Destroy).await
    }

    async fn plan_against(&self, graph: &ResourceGraph) -> Result<ExecutionPlan> {
        let baseline = self.load_baseline().await?;
        let change_set = DiffEngine::new().diff(graph, &baseline, &self.registry);
        Scheduler::new().schedule(change_set, graph, &baseline, &self.registry)
    }

    /// Runs a plan under the state lock.
    async fn run(&self, graph: &ResourceGraph, operation: RunOperation) -> Result<RunReport> {
        let lock = self.store.acquire_lock("").await?;
        let result = self.run_locked(graph, operation).await;
        let released = self.store.release_lock(&lock.lock_id).await;

        let report = result?;
        released?;
        Ok(report)
    }

    async fn run_locked(
        &self,
        graph: &ResourceGraph,
        operation: RunOperation,
    ) -> Result<RunReport> {
        let baseline = self.load_baseline().await?;
        let change_set = DiffEngine::new().diff(graph, &baseline, &self.registry);
        let plan = Scheduler::new().schedule(change_set, graph, &baseline, &self.registry)?;

        if plan.is_converged() {
            info!("Nothing to do: state matches the document");
        }

        let mut recorder = StateRecorder::new(baseline, self.store.as_ref());
        let executor = ApplyExecutor::new(Arc::clone(&self.provider))
            .with_concurrency(self.concurrency)
            .with_cancel_flag(self.cancel.clone());

        let report = executor
            .execute(&plan, graph, &self.registry, &mut recorder)
            .await?;

        let touched: Vec<String> = report
            .results
            .iter()
            .filter(|r| r.operation != OperationKind::NoOp)
            .map(|r| r.logical_id.clone())
            .collect();
        let history = if report.is_success() {
            RunHistoryEntry::new(operation, touched)
        } else {
            let error = report
                .first_error()
                .unwrap_or("some operations were skipped");
            RunHistoryEntry::failed(operation, touched, error)
        };
        recorder.record_history(history).await?;

        Ok(report)
    }

    /// Loads the baseline snapshot, falling back to an empty one on the
    /// first run.
    async fn load_baseline(&self) -> Result<StateSnapshot> {
        Ok(self.store.load().await?.unwrap_or_else(|| {
            StateSnapshot::new(&self.document.stack.name, &self.document.stack.environment)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentParser;
    use crate::error::{StackformError, StateError};
    use crate::executor::RunStatus;
    use crate::provider::{CreatedResource, MockProvider};
    use crate::state::OutputMap;
    use tempfile::TempDir;

    const THREE_TIER: &str = r"
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

    fn document() -> StackDocument {
        DocumentParser::new()
            .parse_yaml(THREE_TIER, None)
            .expect("parse document")
    }

    fn creating_provider() -> MockProvider {
        let mut provider = MockProvider::new();
        provider.expect_create().returning(|kind, _| {
            Ok(CreatedResource {
                provider_id: format!("{kind}-1"),
                outputs: OutputMap::new(),
            })
        });
        provider
    }

    fn engine_with(provider: MockProvider, temp: &TempDir) -> Engine {
        Engine::new(
            document(),
            Arc::new(provider),
            Box::new(LocalStateStore::with_base_dir(temp.path())),
        )
    }

    #[tokio::test]
    async fn apply_then_replan_converges() {
        let temp = TempDir::new().expect("temp dir");
        let engine = engine_with(creating_provider(), &temp);

        let plan = engine.plan().await.expect("plan");
        assert_eq!(plan.create_count(), 5);

        let report = engine.apply().await.expect("apply");
        assert_eq!(report.status, RunStatus::Succeeded);

        // A second plan against the recorded state has nothing to do.
        let plan = engine.plan().await.expect("replan");
        assert!(plan.is_converged());
    }

    #[tokio::test]
    async fn destroy_removes_every_record() {
        let temp = TempDir::new().expect("temp dir");
        let mut provider = creating_provider();
        provider.expect_delete().times(5).returning(|_, _| Ok(()));
        let engine = engine_with(provider, &temp);

        engine.apply().await.expect("apply");
        let report = engine.destroy().await.expect("destroy");
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.results.len(), 5);

        let store = LocalStateStore::with_base_dir(temp.path());
        let snapshot = store.load().await.expect("load").expect("exists");
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn held_lock_blocks_a_run() {
        let temp = TempDir::new().expect("temp dir");
        let other = LocalStateStore::with_base_dir(temp.path());
        let _lock = other.acquire_lock("another-process").await.expect("lock");

        let engine = engine_with(MockProvider::new(), &temp);
        let result = engine.apply().await;
        assert!(matches!(
            result,
            Err(StackformError::State(StateError::LockedByOther { .. }))
        ));
    }

    #[tokio::test]
    async fn lock_is_released_after_a_run() {
        let temp = TempDir::new().expect("temp dir");
        let engine = engine_with(creating_provider(), &temp);
        engine.apply().await.expect("apply");

        let store = LocalStateStore::with_base_dir(temp.path());
        assert!(!store.is_locked().await.expect("is_locked"));
    }

    #[tokio::test]
    async fn failed_run_is_recorded_in_history_and_rerunnable() {
        let temp = TempDir::new().expect("temp dir");

        // First run: the vpc fails, everything downstream is skipped.
        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .withf(|kind, _| kind == "network.vpc")
            .times(1)
            .returning(|_, _| {
                Err(StackformError::Provider(
                    crate::error::ProviderError::operation(500, "boom"),
                ))
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
        provider
            .expect_create()
            .withf(|kind, _| kind.starts_with("container") || kind.starts_with("database"))
            .times(0);

        let engine = engine_with(provider, &temp);
        let report = engine.apply().await.expect("apply");
        assert_eq!(report.status, RunStatus::PartialFailure);

        let store = LocalStateStore::with_base_dir(temp.path());
        let snapshot = store.load().await.expect("load").expect("exists");
        let last = snapshot.history.last().expect("history entry");
        assert!(!last.success);
        assert_eq!(last.operation, RunOperation::Apply);

        // Second run: only the four missing resources are created.
        let engine = engine_with(creating_provider(), &temp);
        let plan = engine.plan().await.expect("replan");
        assert_eq!(plan.create_count(), 4);
        let report = engine.apply().await.expect("re-apply");
        assert_eq!(report.status, RunStatus::Succeeded);
    }
}
