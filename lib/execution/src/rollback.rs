//! Best-effort compensation for a failed, rollback-enabled run.

use crate::context::ExecutionContext;
use crate::error::NodeExecutionError;
use async_trait::async_trait;
use meridian_graph::{ExecutionPlan, Node, NodeId};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::warn;

/// Performs the compensating action for one node kind.
///
/// The default implementation is a no-op; integrations register their own
/// compensating actions out of band by supplying a different
/// [`RollbackHandler`] to [`rollback`].
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    /// Attempts to compensate for `node`'s effects, given its recorded
    /// output. Failures are logged by the caller and never escalate.
    async fn compensate(&self, node: &Node, output: &JsonValue) -> Result<(), NodeExecutionError>;
}

/// A [`RollbackHandler`] that performs no compensating action.
pub struct NoopRollbackHandler;

#[async_trait]
impl RollbackHandler for NoopRollbackHandler {
    async fn compensate(&self, _node: &Node, _output: &JsonValue) -> Result<(), NodeExecutionError> {
        Ok(())
    }
}

/// Rolls back every executed node in `plan`, in reverse topological order,
/// restricted to `executed`. Best-effort: a handler failure is logged and
/// does not change the run's terminal status.
pub async fn rollback(
    plan: &ExecutionPlan,
    executed: &HashSet<NodeId>,
    nodes_by_id: &std::collections::HashMap<NodeId, Node>,
    outputs: &std::collections::HashMap<NodeId, JsonValue>,
    handler: &dyn RollbackHandler,
    ctx: &ExecutionContext,
) {
    for node_id in plan.reverse_order() {
        if !executed.contains(&node_id) {
            continue;
        }
        let Some(node) = nodes_by_id.get(&node_id) else { continue };
        let output = outputs.get(&node_id).cloned().unwrap_or(JsonValue::Null);
        if let Err(err) = handler.compensate(node, &output).await {
            warn!(run_id = %ctx.run_id, node_id = %node_id, error = %err, "rollback handler failed");
        }
    }
}
