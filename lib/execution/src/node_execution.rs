//! The `NodeExecution` entity and its status state machine.

use crate::error::NodeExecutionError;
use chrono::{DateTime, Duration, Utc};
use meridian_core::WorkflowRunId;
use meridian_graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default retention window for a node-execution record.
pub const DEFAULT_NODE_RETENTION: Duration = Duration::days(7);

/// The lifecycle status of a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeExecutionStatus {
    /// Not yet attempted.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Success,
    /// Exhausted its retry budget or hit a non-retryable error.
    Failed,
    /// Never reached because an upstream branch failed or was not taken.
    Skipped,
    /// Failed an attempt but will retry.
    Retrying,
}

/// Wall-clock and approximate resource cost of one node attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Wall-clock duration of the attempt, in milliseconds.
    pub wall_time_ms: u64,
}

/// A single node's execution record within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    /// The run this record belongs to.
    pub run_id: WorkflowRunId,
    /// The node this record tracks.
    pub node_id: NodeId,
    /// Current status.
    pub status: NodeExecutionStatus,
    /// When the current/most recent attempt started.
    pub started_at: DateTime<Utc>,
    /// When the node reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// The input passed to the node.
    pub input: JsonValue,
    /// The node's output, set iff `status == Success`.
    pub output: Option<JsonValue>,
    /// The most recent error, set iff `status ∈ {Failed, Retrying}`.
    pub error: Option<NodeExecutionError>,
    /// Number of retry attempts so far (0 on the first attempt).
    pub retry_count: u32,
    /// Wall-clock time of the most recent attempt.
    pub execution_time_ms: Option<u64>,
    /// Resource usage of the most recent attempt.
    pub resource_usage: Option<ResourceUsage>,
}

impl NodeExecution {
    /// Creates a fresh `Pending` record for `node_id` with the given input.
    pub fn pending(run_id: WorkflowRunId, node_id: NodeId, input: JsonValue) -> Self {
        Self {
            run_id,
            node_id,
            status: NodeExecutionStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            input,
            output: None,
            error: None,
            retry_count: 0,
            execution_time_ms: None,
            resource_usage: None,
        }
    }

    /// Marks the record `Running`, refreshing `started_at` for the new
    /// attempt.
    pub fn mark_running(&mut self) {
        self.status = NodeExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    /// Marks the record `Success` with the given output.
    pub fn mark_success(&mut self, output: JsonValue, resource_usage: ResourceUsage) {
        self.status = NodeExecutionStatus::Success;
        self.finished_at = Some(Utc::now());
        self.output = Some(output);
        self.error = None;
        self.execution_time_ms = Some(resource_usage.wall_time_ms);
        self.resource_usage = Some(resource_usage);
    }

    /// Marks the record `Retrying` after a retryable failure.
    pub fn mark_retrying(&mut self, error: NodeExecutionError) {
        self.status = NodeExecutionStatus::Retrying;
        self.error = Some(error);
    }

    /// Marks the record `Failed` (retries exhausted or non-retryable).
    pub fn mark_failed(&mut self, error: NodeExecutionError) {
        self.status = NodeExecutionStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Marks the record `Skipped` (an upstream branch was not taken).
    pub fn mark_skipped(&mut self) {
        self.status = NodeExecutionStatus::Skipped;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NodeExecution {
        NodeExecution::pending(WorkflowRunId::new(), NodeId::new("A"), JsonValue::Null)
    }

    #[test]
    fn pending_record_has_no_finished_at() {
        let record = record();
        assert_eq!(record.status, NodeExecutionStatus::Pending);
        assert!(record.finished_at.is_none());
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn success_sets_output_and_clears_error() {
        let mut record = record();
        record.mark_running();
        record.mark_retrying(NodeExecutionError::network("transient"));
        record.mark_success(serde_json::json!({"ok": true}), ResourceUsage { wall_time_ms: 12 });
        assert_eq!(record.status, NodeExecutionStatus::Success);
        assert!(record.error.is_none());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn failed_sets_error_and_finished_at() {
        let mut record = record();
        record.mark_running();
        record.mark_failed(NodeExecutionError::validation("BAD_INPUT", "missing field"));
        assert_eq!(record.status, NodeExecutionStatus::Failed);
        assert!(record.error.is_some());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn skipped_sets_finished_at() {
        let mut record = record();
        record.mark_skipped();
        assert_eq!(record.status, NodeExecutionStatus::Skipped);
        assert!(record.finished_at.is_some());
    }
}
