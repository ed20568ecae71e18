//! The trait boundaries (ports) the engine is built against.
//!
//! Concrete adapters live in sibling crates: `meridian-store` implements
//! [`RunStore`], [`NodeExecutionStore`], and [`WorkflowRepository`] against
//! PostgreSQL; `meridian-events` implements [`EventBus`] against NATS. The
//! engine itself only ever depends on these traits.

use crate::node_execution::NodeExecution;
use crate::run::Run;
use async_trait::async_trait;
use meridian_core::WorkflowRunId;
use meridian_graph::{NodeId, WorkflowGraph};
use std::fmt;

/// Error returned by a [`RunStore`] or [`NodeExecutionStore`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Error returned by a [`WorkflowRepository`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No graph exists for the requested `(workflowId, version)`.
    NotFound,
    /// The repository's backing store failed.
    Backend(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "workflow not found"),
            Self::Backend(message) => write!(f, "repository backend error: {message}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// The outcome of a conditional insert into the run store.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// A new run record was created.
    Inserted(Run),
    /// A run with this id already existed; it is returned unchanged so the
    /// caller can respond idempotently.
    AlreadyExists(Run),
}

/// Durable storage for [`Run`] records (C1).
///
/// Implementations must make `insert_queued` a conditional insert keyed on
/// `run_id` (idempotency is load-bearing, not best-effort) and must reject
/// `mark_*` calls that don't match the expected prior status.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts `run` iff no record with the same `run_id` exists.
    async fn insert_queued(&self, run: Run) -> Result<InsertOutcome, StoreError>;

    /// Reads a run by id.
    async fn get(&self, run_id: WorkflowRunId) -> Result<Option<Run>, StoreError>;

    /// Transitions a run `Queued -> Running`. Returns `true` iff this call
    /// performed the transition; `false` means the run was not `Queued`
    /// (already claimed by another worker, or already terminal), which the
    /// caller must treat as "do not traverse" rather than an error.
    async fn mark_running(&self, run_id: WorkflowRunId) -> Result<bool, StoreError>;

    /// Transitions a run `Running -> Success`.
    async fn mark_success(&self, run_id: WorkflowRunId) -> Result<(), StoreError>;

    /// Transitions a run `Running -> Failed`, recording `error`.
    async fn mark_failed(&self, run_id: WorkflowRunId, error: crate::error::RunError) -> Result<(), StoreError>;
}

/// Durable storage for [`NodeExecution`] records (C2), keyed by
/// `(run_id, node_id)`.
#[async_trait]
pub trait NodeExecutionStore: Send + Sync {
    /// Inserts or replaces the record for `(run_id, node_id)`.
    async fn upsert(&self, record: NodeExecution) -> Result<(), StoreError>;

    /// Reads the record for `(run_id, node_id)`, if it exists.
    async fn get(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<Option<NodeExecution>, StoreError>;

    /// Lists every record for a run, in no particular order.
    async fn list_for_run(&self, run_id: WorkflowRunId) -> Result<Vec<NodeExecution>, StoreError>;

    /// Atomically increments and returns the retry counter for
    /// `(run_id, node_id)`.
    async fn increment_retry(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<u32, StoreError>;
}

/// Read-only access to workflow graph definitions (C3).
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Fetches a graph by workflow id and optional version; `None` means
    /// "latest".
    async fn get_graph(
        &self,
        workflow_id: meridian_core::WorkflowId,
        version: Option<&str>,
    ) -> Result<WorkflowGraph, RepositoryError>;
}

/// A metering event, tracking the lifecycle of a run from the outside.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum MeteringEvent {
    /// A run was accepted and enqueued.
    TaskEnqueued {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        payload_size_bytes: usize,
        has_start_node: bool,
    },
    /// A worker began processing a run.
    TaskStarted { tenant_id: String, workflow_id: String, run_id: String },
    /// A run finished successfully.
    TaskCompleted {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        execution_time_ms: u64,
        completed_nodes: usize,
        total_nodes: usize,
    },
    /// A run terminated with a failure.
    TaskFailed {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        error_message: String,
        step_id: Option<String>,
    },
}

/// A progress event, tracking individual node transitions within a run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A node began executing.
    NodeStarted {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        node_id: String,
        completed_nodes: usize,
        total_nodes: usize,
    },
    /// A node completed successfully.
    NodeCompleted {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        node_id: String,
        completed_nodes: usize,
        total_nodes: usize,
    },
    /// A node failed (the run may still continue, depending on
    /// `errorStrategy`).
    NodeFailed {
        tenant_id: String,
        workflow_id: String,
        run_id: String,
        node_id: String,
        error_message: String,
        completed_nodes: usize,
        total_nodes: usize,
    },
}

/// Best-effort publication of metering and progress events (C5).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a metering event.
    async fn publish_metering(&self, event: MeteringEvent) -> Result<(), StoreError>;

    /// Publishes a progress event.
    async fn publish_progress(&self, event: ProgressEvent) -> Result<(), StoreError>;
}
