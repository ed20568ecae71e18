//! The `Run` entity and its status state machine.

use crate::error::RunError;
use chrono::{DateTime, Duration, Utc};
use meridian_core::{TenantId, WorkflowId, WorkflowRunId};
use meridian_graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default retention window for a completed run, per the submission
/// contract's `retentionDeadline`.
pub const DEFAULT_RUN_RETENTION: Duration = Duration::days(30);

/// The lifecycle status of a run. Transitions only ever move forward;
/// `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Accepted and enqueued, not yet picked up by a worker.
    Queued,
    /// A worker is actively traversing the graph.
    Running,
    /// Traversal completed with no propagated error.
    Success,
    /// Traversal terminated due to a node failure or an invalid graph.
    Failed,
}

impl RunStatus {
    /// Whether this status is terminal (no further transitions allowed).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A single execution (run) of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Caller-supplied idempotency key.
    pub run_id: WorkflowRunId,
    /// The workflow this run executes.
    pub workflow_id: WorkflowId,
    /// The tenant that owns this run.
    pub tenant_id: TenantId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the run was accepted by the Submission API.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Explicit entry node, overriding the graph's `START` node.
    pub start_node_id: Option<NodeId>,
    /// The caller-supplied payload.
    pub payload: JsonValue,
    /// Set iff `status == Failed`.
    pub error: Option<RunError>,
    /// When the run record was created.
    pub created_at: DateTime<Utc>,
    /// When the run record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When this record becomes eligible for retention sweep.
    pub retention_deadline: DateTime<Utc>,
}

impl Run {
    /// Creates a new run in `Queued` status with the default retention
    /// window.
    pub fn new_queued(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        start_node_id: Option<NodeId>,
        payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            workflow_id,
            tenant_id,
            status: RunStatus::Queued,
            started_at: now,
            finished_at: None,
            start_node_id,
            payload,
            error: None,
            created_at: now,
            updated_at: now,
            retention_deadline: now + DEFAULT_RUN_RETENTION,
        }
    }

    /// Transitions `Queued -> Running`.
    ///
    /// # Errors
    ///
    /// Returns the run unchanged (as `Err`) if it is not currently `Queued`.
    pub fn transition_running(&mut self) -> Result<(), RunStatus> {
        if self.status != RunStatus::Queued {
            return Err(self.status);
        }
        self.status = RunStatus::Running;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transitions `Running -> Success`.
    pub fn transition_success(&mut self) -> Result<(), RunStatus> {
        if self.status != RunStatus::Running {
            return Err(self.status);
        }
        let now = Utc::now();
        self.status = RunStatus::Success;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transitions `Running -> Failed`, recording `error`.
    pub fn transition_failed(&mut self, error: RunError) -> Result<(), RunStatus> {
        if self.status != RunStatus::Running {
            return Err(self.status);
        }
        let now = Utc::now();
        self.status = RunStatus::Failed;
        self.finished_at = Some(now);
        self.error = Some(error);
        self.updated_at = now;
        Ok(())
    }
}
