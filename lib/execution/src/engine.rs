//! The traversal engine: dequeue (by id) -> load graph -> validate -> build
//! plan -> traverse -> dispatch nodes -> record state -> publish events ->
//! finalize.
//!
//! `Engine` is generic over its store/repository/executor/event-bus ports so
//! the run and node state machines, retry policy, and rollback can all be
//! exercised against in-memory fakes without a live database or broker.

use crate::context::{ExecutionContext, TenantResources};
use crate::error::{EngineError, NodeExecutionError, RunError};
use crate::executor::NodeExecutor;
use crate::node_execution::{NodeExecution, NodeExecutionStatus, ResourceUsage};
use crate::ports::{EventBus, MeteringEvent, NodeExecutionStore, ProgressEvent, RunStore, WorkflowRepository};
use crate::retry::compute_delay;
use crate::rollback::{rollback, RollbackHandler};
use meridian_core::WorkflowRunId;
use meridian_graph::{EdgeCondition, ErrorStrategy, GraphBuilder, Node, NodeId, WorkflowGraph};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// The traversal engine. Generic over its five ports so tests can supply
/// in-memory fakes without any networked dependency.
pub struct Engine<S, N, W, X, B> {
    run_store: S,
    node_store: N,
    repository: W,
    executor: X,
    events: B,
    rollback_handler: Box<dyn RollbackHandler>,
}

impl<S, N, W, X, B> Engine<S, N, W, X, B>
where
    S: RunStore,
    N: NodeExecutionStore,
    W: WorkflowRepository,
    X: NodeExecutor,
    B: EventBus,
{
    /// Builds an engine with a no-op rollback handler.
    pub fn new(run_store: S, node_store: N, repository: W, executor: X, events: B) -> Self {
        Self {
            run_store,
            node_store,
            repository,
            executor,
            events,
            rollback_handler: Box::new(crate::rollback::NoopRollbackHandler),
        }
    }

    /// Builds an engine with a caller-supplied rollback handler.
    pub fn with_rollback_handler(
        run_store: S,
        node_store: N,
        repository: W,
        executor: X,
        events: B,
        rollback_handler: Box<dyn RollbackHandler>,
    ) -> Self {
        Self { run_store, node_store, repository, executor, events, rollback_handler }
    }

    /// Processes one run to completion: transitions it to `RUNNING`, loads
    /// and validates its graph, traverses it, and records a terminal
    /// status. `resources` carries the tenant's resolved secrets and
    /// integration configuration for the duration of this run.
    #[instrument(skip(self, resources), fields(run_id = %run_id))]
    pub async fn process_run(&self, run_id: WorkflowRunId, resources: TenantResources) -> Result<(), EngineError> {
        let run = self
            .run_store
            .get(run_id)
            .await
            .map_err(|e| EngineError::Backend { message: e.to_string() })?
            .ok_or(EngineError::Backend { message: "run not found".to_string() })?;

        if run.status.is_terminal() {
            info!(status = ?run.status, "run already in a terminal status, ignoring redelivered message");
            return Ok(());
        }

        let already_running = run.status == crate::run::RunStatus::Running;
        let claimed = self
            .run_store
            .mark_running(run_id)
            .await
            .map_err(|e| EngineError::Backend { message: e.to_string() })?;
        if !claimed && !already_running {
            info!("run could not be claimed (raced with another worker or went terminal), ignoring redelivered message");
            return Ok(());
        }

        let _ = self
            .events
            .publish_metering(MeteringEvent::TaskStarted {
                tenant_id: run.tenant_id.to_string(),
                workflow_id: run.workflow_id.to_string(),
                run_id: run_id.to_string(),
            })
            .await;

        let graph = match self.repository.get_graph(run.workflow_id, None).await {
            Ok(graph) => graph,
            Err(_) => return self.terminate_failed(run_id, &run, EngineError::WorkflowNotFound).await,
        };

        let plan = match GraphBuilder::build(&graph) {
            Ok(plan) => plan,
            Err(err) => return self.terminate_failed(run_id, &run, err.into()).await,
        };

        let Some(start_id) = run.start_node_id.clone().or_else(|| graph.start_node_id().cloned()) else {
            return self.terminate_failed(run_id, &run, EngineError::WorkflowNotFound).await;
        };

        let mut ctx = ExecutionContext::new(
            run_id,
            run.workflow_id,
            run.tenant_id.clone(),
            run.payload.clone(),
            resources,
            graph.config.max_execution_time_ms,
        );

        match self.traverse(&graph, &plan, &start_id, &mut ctx).await {
            Ok(executed) => {
                info!(nodes_completed = executed, "run completed successfully");
                self.run_store
                    .mark_success(run_id)
                    .await
                    .map_err(|e| EngineError::Backend { message: e.to_string() })?;
                let _ = self
                    .events
                    .publish_metering(MeteringEvent::TaskCompleted {
                        tenant_id: run.tenant_id.to_string(),
                        workflow_id: run.workflow_id.to_string(),
                        run_id: run_id.to_string(),
                        execution_time_ms: (chrono::Utc::now() - ctx.start_time).num_milliseconds().max(0) as u64,
                        completed_nodes: executed,
                        total_nodes: plan.total_tasks,
                    })
                    .await;
                Ok(())
            }
            Err((err, executed_set, nodes_by_id, outputs)) => {
                if graph.config.enable_rollback {
                    rollback(&plan, &executed_set, &nodes_by_id, &outputs, self.rollback_handler.as_ref(), &ctx).await;
                }
                self.terminate_failed(run_id, &run, err).await
            }
        }
    }

    async fn terminate_failed(
        &self,
        run_id: WorkflowRunId,
        run: &crate::run::Run,
        err: EngineError,
    ) -> Result<(), EngineError> {
        let run_error: RunError = err.to_run_error();
        self.run_store
            .mark_failed(run_id, run_error.clone())
            .await
            .map_err(|e| EngineError::Backend { message: e.to_string() })?;
        let _ = self
            .events
            .publish_metering(MeteringEvent::TaskFailed {
                tenant_id: run.tenant_id.to_string(),
                workflow_id: run.workflow_id.to_string(),
                run_id: run_id.to_string(),
                error_message: run_error.message,
                step_id: run_error.step_id,
            })
            .await;
        Err(err)
    }

    /// Returns `Ok(nodes_executed)` on success, or `Err` carrying enough
    /// state (the fatal error, the executed set, a node lookup table, and
    /// recorded outputs) for the caller to run rollback.
    #[allow(clippy::type_complexity)]
    async fn traverse(
        &self,
        graph: &WorkflowGraph,
        plan: &meridian_graph::ExecutionPlan,
        start_id: &NodeId,
        ctx: &mut ExecutionContext,
    ) -> Result<usize, (EngineError, HashSet<NodeId>, HashMap<NodeId, Node>, HashMap<NodeId, JsonValue>)> {
        let nodes_by_id: HashMap<NodeId, Node> = graph.nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();
        let in_degree: HashMap<&NodeId, usize> = plan.nodes.iter().map(|n| (&n.id, n.in_degree)).collect();
        let max_concurrent = graph.config.max_concurrent_nodes.max(1);

        let mut executed: HashSet<NodeId> = HashSet::new();
        let mut outputs: HashMap<NodeId, JsonValue> = HashMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(start_id.clone());

        while !queue.is_empty() {
            if ctx.is_timed_out() {
                let err = EngineError::NodeFailed {
                    node_id: "<run>".to_string(),
                    error: NodeExecutionError::timeout("run exceeded its execution deadline"),
                };
                return Err((err, executed, nodes_by_id, outputs));
            }

            let mut batch = Vec::new();
            while batch.len() < max_concurrent {
                let Some(next) = queue.pop_front() else { break };
                if executed.contains(&next) || batch.contains(&next) {
                    continue;
                }
                batch.push(next);
            }
            if batch.is_empty() {
                continue;
            }

            let snapshot = ctx.clone();
            let completed_before_batch = executed.len();
            let futures = batch.iter().map(|node_id| {
                let node = nodes_by_id.get(node_id).expect("node id came from the validated graph");
                let input = Self::build_input(node_id, start_id, &snapshot);
                self.execute_node_attempt(node, node_id, &snapshot, input, completed_before_batch, plan.total_tasks)
            });
            let results = futures::future::join_all(futures).await;

            for (node_id, result) in batch.into_iter().zip(results) {
                executed.insert(node_id.clone());
                let node = &nodes_by_id[&node_id];

                match result {
                    Ok(output) => {
                        outputs.insert(node_id.clone(), output.clone());
                        ctx.merge_output(&output);
                        if node.kind.is_terminal() {
                            continue;
                        }
                        for edge in graph.outgoing_edges(&node_id) {
                            let scope = ctx.interpolation_scope(&output);
                            let taken = Self::edge_taken(&edge.condition, true, &scope);
                            if taken {
                                if !executed.contains(&edge.to_node_id) && !queue.contains(&edge.to_node_id) {
                                    queue.push_back(edge.to_node_id.clone());
                                }
                            } else if in_degree.get(&edge.to_node_id).copied() == Some(1) {
                                self.mark_skipped(ctx.run_id, &edge.to_node_id, &snapshot).await;
                            }
                        }
                    }
                    Err(node_err) => {
                        let failure_edges: Vec<_> = graph
                            .outgoing_edges(&node_id)
                            .filter(|e| matches!(e.condition, Some(EdgeCondition::Failure)))
                            .collect();

                        if !failure_edges.is_empty() {
                            for edge in failure_edges {
                                if !executed.contains(&edge.to_node_id) && !queue.contains(&edge.to_node_id) {
                                    queue.push_back(edge.to_node_id.clone());
                                }
                            }
                            continue;
                        }

                        match graph.config.error_strategy {
                            ErrorStrategy::Continue => continue,
                            ErrorStrategy::Stop | ErrorStrategy::Rollback => {
                                let err = EngineError::NodeFailed { node_id: node_id.to_string(), error: node_err };
                                return Err((err, executed, nodes_by_id, outputs));
                            }
                        }
                    }
                }
            }
        }

        Ok(executed.len())
    }

    fn build_input(node_id: &NodeId, start_id: &NodeId, ctx: &ExecutionContext) -> JsonValue {
        if node_id == start_id {
            ctx.payload.clone()
        } else {
            JsonValue::Object(ctx.variables.clone().into_iter().collect())
        }
    }

    fn edge_taken(condition: &Option<EdgeCondition>, node_succeeded: bool, scope: &HashMap<String, JsonValue>) -> bool {
        match condition {
            None | Some(EdgeCondition::Always) => true,
            Some(EdgeCondition::Success) => node_succeeded,
            Some(EdgeCondition::Failure) => !node_succeeded,
            Some(EdgeCondition::Expression { expression }) => {
                meridian_graph::expr::evaluate(expression, scope).unwrap_or_else(|| {
                    warn!(expression = %expression, "edge expression failed to evaluate; treating as not taken");
                    false
                })
            }
        }
    }

    async fn mark_skipped(&self, run_id: WorkflowRunId, node_id: &NodeId, ctx: &ExecutionContext) {
        let _ = ctx;
        let mut record = NodeExecution::pending(run_id, node_id.clone(), JsonValue::Null);
        record.mark_skipped();
        let _ = self.node_store.upsert(record).await;
    }

    async fn execute_node_attempt(
        &self,
        node: &Node,
        node_id: &NodeId,
        ctx: &ExecutionContext,
        input: JsonValue,
        completed_nodes: usize,
        total_nodes: usize,
    ) -> Result<JsonValue, NodeExecutionError> {
        let existing = self.node_store.get(ctx.run_id, node_id).await.ok().flatten();

        if let Some(record) = &existing {
            if record.status == NodeExecutionStatus::Success {
                if let Some(output) = &record.output {
                    info!(node_id = %node_id, "node already completed, skipping re-execution on redelivery");
                    return Ok(output.clone());
                }
            }
        }

        let _ = self
            .events
            .publish_progress(ProgressEvent::NodeStarted {
                tenant_id: ctx.tenant_id.to_string(),
                workflow_id: ctx.workflow_id.to_string(),
                run_id: ctx.run_id.to_string(),
                node_id: node_id.to_string(),
                completed_nodes,
                total_nodes,
            })
            .await;

        let mut record = existing.unwrap_or_else(|| NodeExecution::pending(ctx.run_id, node_id.clone(), input.clone()));
        record.mark_running();
        let _ = self.node_store.upsert(record.clone()).await;

        let max_attempts = node.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let started = Instant::now();
            match self.executor.execute(node, ctx, &input).await {
                Ok(output) => {
                    record.mark_success(output.clone(), ResourceUsage { wall_time_ms: started.elapsed().as_millis() as u64 });
                    let _ = self.node_store.upsert(record).await;
                    let _ = self
                        .events
                        .publish_progress(ProgressEvent::NodeCompleted {
                            tenant_id: ctx.tenant_id.to_string(),
                            workflow_id: ctx.workflow_id.to_string(),
                            run_id: ctx.run_id.to_string(),
                            node_id: node_id.to_string(),
                            completed_nodes: completed_nodes + 1,
                            total_nodes,
                        })
                        .await;
                    return Ok(output);
                }
                Err(err) => {
                    if err.retryable && attempt < max_attempts {
                        record.mark_retrying(err.clone());
                        let _ = self.node_store.upsert(record.clone()).await;
                        let _ = self.node_store.increment_retry(ctx.run_id, node_id).await;
                        record.retry_count += 1;
                        let delay = compute_delay(node.retry.backoff, attempt, node.retry.delay_ms, node.retry.jitter);
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    record.mark_failed(err.clone());
                    let _ = self.node_store.upsert(record).await;
                    let _ = self
                        .events
                        .publish_progress(ProgressEvent::NodeFailed {
                            tenant_id: ctx.tenant_id.to_string(),
                            workflow_id: ctx.workflow_id.to_string(),
                            run_id: ctx.run_id.to_string(),
                            node_id: node_id.to_string(),
                            error_message: err.message.clone(),
                            completed_nodes,
                            total_nodes,
                        })
                        .await;
                    return Err(err);
                }
            }
        }

        unreachable!("retry loop always returns on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InsertOutcome, RepositoryError, StoreError};
    use crate::run::Run;
    use async_trait::async_trait;
    use meridian_core::{TenantId, WorkflowId};
    use meridian_graph::{Edge, GraphConfig, NodeKind};
    use std::sync::Mutex as StdMutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct InMemoryRunStore {
        runs: Arc<StdMutex<HashMap<WorkflowRunId, Run>>>,
    }

    #[async_trait]
    impl RunStore for InMemoryRunStore {
        async fn insert_queued(&self, run: Run) -> Result<InsertOutcome, StoreError> {
            let mut runs = self.runs.lock().unwrap();
            if let Some(existing) = runs.get(&run.run_id) {
                return Ok(InsertOutcome::AlreadyExists(existing.clone()));
            }
            runs.insert(run.run_id, run.clone());
            Ok(InsertOutcome::Inserted(run))
        }

        async fn get(&self, run_id: WorkflowRunId) -> Result<Option<Run>, StoreError> {
            Ok(self.runs.lock().unwrap().get(&run_id).cloned())
        }

        async fn mark_running(&self, run_id: WorkflowRunId) -> Result<bool, StoreError> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs.get_mut(&run_id).ok_or_else(|| StoreError("missing".to_string()))?;
            Ok(run.transition_running().is_ok())
        }

        async fn mark_success(&self, run_id: WorkflowRunId) -> Result<(), StoreError> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs.get_mut(&run_id).ok_or_else(|| StoreError("missing".to_string()))?;
            run.transition_success().map_err(|s| StoreError(format!("{s:?}")))
        }

        async fn mark_failed(&self, run_id: WorkflowRunId, error: RunError) -> Result<(), StoreError> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs.get_mut(&run_id).ok_or_else(|| StoreError("missing".to_string()))?;
            run.transition_failed(error).map_err(|s| StoreError(format!("{s:?}")))
        }
    }

    #[derive(Default)]
    struct InMemoryNodeStore {
        records: Arc<StdMutex<HashMap<(WorkflowRunId, NodeId), NodeExecution>>>,
    }

    #[async_trait]
    impl NodeExecutionStore for InMemoryNodeStore {
        async fn upsert(&self, record: NodeExecution) -> Result<(), StoreError> {
            self.records.lock().unwrap().insert((record.run_id, record.node_id.clone()), record);
            Ok(())
        }

        async fn get(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<Option<NodeExecution>, StoreError> {
            Ok(self.records.lock().unwrap().get(&(run_id, node_id.clone())).cloned())
        }

        async fn list_for_run(&self, run_id: WorkflowRunId) -> Result<Vec<NodeExecution>, StoreError> {
            Ok(self.records.lock().unwrap().values().filter(|r| r.run_id == run_id).cloned().collect())
        }

        async fn increment_retry(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<u32, StoreError> {
            let mut records = self.records.lock().unwrap();
            let record = records.get_mut(&(run_id, node_id.clone())).ok_or_else(|| StoreError("missing".to_string()))?;
            record.retry_count += 1;
            Ok(record.retry_count)
        }
    }

    struct StaticRepository(WorkflowGraph);

    #[async_trait]
    impl WorkflowRepository for StaticRepository {
        async fn get_graph(&self, _workflow_id: WorkflowId, _version: Option<&str>) -> Result<WorkflowGraph, RepositoryError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingEventBus {
        metering: Arc<StdMutex<Vec<MeteringEvent>>>,
        progress: Arc<StdMutex<Vec<ProgressEvent>>>,
    }

    #[async_trait]
    impl EventBus for RecordingEventBus {
        async fn publish_metering(&self, event: MeteringEvent) -> Result<(), StoreError> {
            self.metering.lock().unwrap().push(event);
            Ok(())
        }

        async fn publish_progress(&self, event: ProgressEvent) -> Result<(), StoreError> {
            self.progress.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn build_engine(
        graph: WorkflowGraph,
    ) -> (
        Engine<InMemoryRunStore, InMemoryNodeStore, StaticRepository, crate::executor::DefaultNodeExecutor, RecordingEventBus>,
        Arc<StdMutex<HashMap<WorkflowRunId, Run>>>,
        Arc<StdMutex<Vec<MeteringEvent>>>,
        Arc<StdMutex<Vec<ProgressEvent>>>,
    ) {
        let run_store = InMemoryRunStore::default();
        let runs = run_store.runs.clone();
        let node_store = InMemoryNodeStore::default();
        let repository = StaticRepository(graph);
        let executor = crate::executor::DefaultNodeExecutor::default();
        let events = RecordingEventBus::default();
        let metering = events.metering.clone();
        let progress = events.progress.clone();
        (Engine::new(run_store, node_store, repository, executor, events), runs, metering, progress)
    }

    fn linear_graph(workflow_id: WorkflowId) -> WorkflowGraph {
        WorkflowGraph {
            workflow_id,
            version: "1.0.0".to_string(),
            tenant_id: tenant(),
            nodes: vec![
                Node::new("START", NodeKind::Start),
                Node::new("A", NodeKind::Delay { delay_ms: 1 }),
                Node::new("END", NodeKind::End),
            ],
            edges: vec![Edge::new("START", "A"), Edge::new("A", "END")],
            config: GraphConfig::default(),
        }
    }

    #[tokio::test]
    async fn s1_linear_happy_path_succeeds() {
        let workflow_id = WorkflowId::new();
        let graph = linear_graph(workflow_id);
        let (engine, runs, metering, _progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, serde_json::json!({"x": 1}));
        runs.lock().unwrap().insert(run_id, run);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);

        let events = metering.lock().unwrap();
        assert!(matches!(events[0], MeteringEvent::TaskStarted { .. }));
        assert!(matches!(events.last().unwrap(), MeteringEvent::TaskCompleted { .. }));
    }

    #[tokio::test]
    async fn s3_non_retryable_failure_fails_run_with_step_id() {
        let workflow_id = WorkflowId::new();
        let mut graph = linear_graph(workflow_id);
        graph.nodes[1] = Node::new(
            "A",
            NodeKind::GoogleWorkspace(meridian_graph::IntegrationOperation {
                account_id: None,
                operation: String::new(),
                params: JsonValue::Null,
            }),
        );
        let (engine, runs, _metering, _progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        runs.lock().unwrap().insert(run_id, run);

        let err = engine.process_run(run_id, TenantResources::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::NodeFailed { ref node_id, .. } if node_id == "A"));

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Failed);
        assert_eq!(final_run.error.unwrap().step_id, Some("A".to_string()));
    }

    #[tokio::test]
    async fn s4_conditional_branch_skips_untaken_path() {
        let workflow_id = WorkflowId::new();
        let graph = WorkflowGraph {
            workflow_id,
            version: "1.0.0".to_string(),
            tenant_id: tenant(),
            nodes: vec![
                Node::new("START", NodeKind::Start),
                Node::new("C", NodeKind::Condition { expression: r#"{{flag}} == "yes""#.to_string() }),
                Node::new("A", NodeKind::DataTransform { transform: meridian_graph::TransformKind::PassThrough }),
                Node::new("B", NodeKind::DataTransform { transform: meridian_graph::TransformKind::PassThrough }),
                Node::new("END", NodeKind::End),
            ],
            edges: vec![
                Edge::new("START", "C"),
                Edge::with_condition(
                    "C",
                    "A",
                    EdgeCondition::Expression { expression: r#"{{result}} == "true""#.to_string() },
                ),
                Edge::with_condition(
                    "C",
                    "B",
                    EdgeCondition::Expression { expression: r#"{{result}} == "false""#.to_string() },
                ),
                Edge::new("A", "END"),
                Edge::new("B", "END"),
            ],
            config: GraphConfig::default(),
        };
        let (engine, runs, _metering, _progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, serde_json::json!({"flag": "yes"}));
        runs.lock().unwrap().insert(run_id, run);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);
    }

    #[tokio::test]
    async fn s5_cycle_rejected_before_any_node_runs() {
        let workflow_id = WorkflowId::new();
        let graph = WorkflowGraph {
            workflow_id,
            version: "1.0.0".to_string(),
            tenant_id: tenant(),
            nodes: vec![
                Node::new("START", NodeKind::Start),
                Node::new("A", NodeKind::Delay { delay_ms: 1 }),
                Node::new("B", NodeKind::Delay { delay_ms: 1 }),
                Node::new("END", NodeKind::End),
            ],
            edges: vec![
                Edge::new("START", "A"),
                Edge::new("A", "B"),
                Edge::new("B", "A"),
                Edge::new("B", "END"),
            ],
            config: GraphConfig::default(),
        };
        let (engine, runs, _metering, progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        runs.lock().unwrap().insert(run_id, run);

        let err = engine.process_run(run_id, TenantResources::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidWorkflow(_)));
        assert!(progress.lock().unwrap().is_empty(), "no node should have been attempted");

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Failed);
    }

    #[tokio::test]
    async fn s2_retry_then_success_records_retry_count() {
        let workflow_id = WorkflowId::new();
        let mut graph = linear_graph(workflow_id);
        graph.nodes[1].retry = meridian_graph::RetryConfig {
            max_attempts: 3,
            backoff: meridian_graph::BackoffStrategy::Fixed,
            delay_ms: 1,
            jitter: false,
        };
        let (engine, runs, _metering, _progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        runs.lock().unwrap().insert(run_id, run);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();
        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);
    }

    /// A [`NodeExecutor`] that fails the first `fail_count` attempts at any
    /// node with a retryable error, then succeeds.
    struct FlakyExecutor {
        remaining_failures: StdMutex<u32>,
    }

    #[async_trait]
    impl NodeExecutor for FlakyExecutor {
        async fn execute(&self, _node: &Node, _ctx: &ExecutionContext, input: &JsonValue) -> Result<JsonValue, NodeExecutionError> {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NodeExecutionError::network("transient failure"));
            }
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn s2_node_that_fails_once_then_succeeds_is_retried_within_budget() {
        let workflow_id = WorkflowId::new();
        let mut graph = linear_graph(workflow_id);
        graph.nodes[1].retry = meridian_graph::RetryConfig {
            max_attempts: 3,
            backoff: meridian_graph::BackoffStrategy::Fixed,
            delay_ms: 1,
            jitter: false,
        };

        let run_store = InMemoryRunStore::default();
        let runs = run_store.runs.clone();
        let node_store = InMemoryNodeStore::default();
        let records = node_store.records.clone();
        let repository = StaticRepository(graph);
        let executor = FlakyExecutor { remaining_failures: StdMutex::new(1) };
        let events = RecordingEventBus::default();
        let engine = Engine::new(run_store, node_store, repository, executor, events);

        let run_id = WorkflowRunId::new();
        let run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        runs.lock().unwrap().insert(run_id, run);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);

        let node_a = records.lock().unwrap().get(&(run_id, NodeId::new("A"))).cloned().unwrap();
        assert_eq!(node_a.status, NodeExecutionStatus::Success);
        assert_eq!(node_a.retry_count, 1, "one retryable failure should cost exactly one retry");
    }

    /// A [`NodeExecutor`] that counts invocations per node id, to assert
    /// already-completed nodes are never re-executed on redelivery.
    #[derive(Default)]
    struct CountingExecutor {
        calls: Arc<StdMutex<HashMap<NodeId, u32>>>,
    }

    #[async_trait]
    impl NodeExecutor for CountingExecutor {
        async fn execute(&self, node: &Node, _ctx: &ExecutionContext, input: &JsonValue) -> Result<JsonValue, NodeExecutionError> {
            *self.calls.lock().unwrap().entry(node.id.clone()).or_insert(0) += 1;
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn redelivery_does_not_re_execute_an_already_completed_node() {
        let workflow_id = WorkflowId::new();
        let graph = linear_graph(workflow_id);

        let run_store = InMemoryRunStore::default();
        let runs = run_store.runs.clone();
        let node_store = InMemoryNodeStore::default();
        let records = node_store.records.clone();
        let repository = StaticRepository(graph);
        let calls = Arc::new(StdMutex::new(HashMap::new()));
        let executor = CountingExecutor { calls: calls.clone() };
        let events = RecordingEventBus::default();
        let engine = Engine::new(run_store, node_store, repository, executor, events);

        let run_id = WorkflowRunId::new();
        let mut run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        run.transition_running().unwrap();
        runs.lock().unwrap().insert(run_id, run);

        let node_a_id = NodeId::new("A");
        let mut completed = NodeExecution::pending(run_id, node_a_id.clone(), JsonValue::Null);
        completed.mark_success(serde_json::json!({"cached": true}), ResourceUsage { wall_time_ms: 5 });
        records.lock().unwrap().insert((run_id, node_a_id.clone()), completed);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);
        assert_eq!(
            calls.lock().unwrap().get(&node_a_id).copied().unwrap_or(0),
            0,
            "a node already recorded as SUCCESS must not be re-executed on redelivery"
        );
    }

    #[tokio::test]
    async fn redelivered_terminal_run_is_a_no_op() {
        let workflow_id = WorkflowId::new();
        let graph = linear_graph(workflow_id);
        let (engine, runs, _metering, _progress) = build_engine(graph);

        let run_id = WorkflowRunId::new();
        let mut run = Run::new_queued(run_id, workflow_id, tenant(), None, JsonValue::Null);
        run.transition_running().unwrap();
        run.transition_success().unwrap();
        runs.lock().unwrap().insert(run_id, run);

        engine.process_run(run_id, TenantResources::default()).await.unwrap();

        let final_run = runs.lock().unwrap().get(&run_id).cloned().unwrap();
        assert_eq!(final_run.status, crate::run::RunStatus::Success);
    }
}
