//! The message carried on the work queue.
//!
//! Identical in shape to the submit request body (§6): a worker pulling a
//! [`WorkItem`] has everything the Execution Engine needs to pick up a run
//! without a second round-trip to the Submission API.

use meridian_core::{TenantId, WorkflowId, WorkflowRunId};
use meridian_graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One execution request as carried on the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// The run this item starts or resumes.
    pub run_id: WorkflowRunId,
    /// The workflow to execute.
    pub workflow_id: WorkflowId,
    /// The tenant that owns the run, used as the queue's ordering group.
    pub tenant_id: TenantId,
    /// Explicit entry node, overriding the graph's `START` node.
    pub start_node_id: Option<NodeId>,
    /// The caller-supplied payload.
    pub payload: JsonValue,
    /// Set when this item was re-enqueued after a worker crash or explicit
    /// retry, as opposed to the original submission.
    #[serde(default)]
    pub retry_attempt: bool,
}

impl WorkItem {
    /// Builds the original (non-retry) work item for a run.
    pub fn new(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        start_node_id: Option<NodeId>,
        payload: JsonValue,
    ) -> Self {
        Self { run_id, workflow_id, tenant_id, start_node_id, payload, retry_attempt: false }
    }

    /// The queue deduplication id for this item: `runId`, or
    /// `runId-retry-<attempt>` when re-enqueuing deliberately so the retry
    /// isn't collapsed against the original delivery.
    #[must_use]
    pub fn dedup_id(&self, retry_sequence: Option<u64>) -> String {
        match retry_sequence {
            Some(seq) if self.retry_attempt => format!("{}-retry-{}", self.run_id, seq),
            _ => self.run_id.to_string(),
        }
    }

    /// The per-tenant ordering group id.
    #[must_use]
    pub fn group_id(&self) -> &str {
        self.tenant_id.as_str()
    }
}
