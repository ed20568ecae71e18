//! The ephemeral execution context carried through one run's traversal.

use chrono::{DateTime, Duration, Utc};
use meridian_core::{TenantId, WorkflowId, WorkflowRunId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Secrets and integration configuration resolved for a tenant at the start
/// of a run. Populated by the caller (the worker loop) from whatever
/// external secret/config store it has access to; this engine only reads
/// from it.
#[derive(Debug, Clone, Default)]
pub struct TenantResources {
    /// Opaque secret values, keyed by name.
    pub secrets: HashMap<String, String>,
    /// Per-integration configuration blobs, keyed by provider name.
    pub integrations: HashMap<String, JsonValue>,
}

/// Mutable, run-scoped state threaded through traversal.
///
/// Constructed once per run and discarded at completion; it is never
/// persisted directly (persisted state lives in [`crate::run::Run`] and
/// [`crate::node_execution::NodeExecution`]).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The run this context belongs to.
    pub run_id: WorkflowRunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The owning tenant.
    pub tenant_id: TenantId,
    /// The original submission payload.
    pub payload: JsonValue,
    /// Variables accumulated from node outputs as traversal proceeds.
    pub variables: HashMap<String, JsonValue>,
    /// Resolved secrets and integration configuration for this tenant.
    pub resources: TenantResources,
    /// When traversal began.
    pub start_time: DateTime<Utc>,
    /// The run-wide deadline.
    pub timeout_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Builds a context for a fresh run.
    pub fn new(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        payload: JsonValue,
        resources: TenantResources,
        max_execution_time_ms: u64,
    ) -> Self {
        let start_time = Utc::now();
        Self {
            run_id,
            workflow_id,
            tenant_id,
            payload,
            variables: HashMap::new(),
            resources,
            start_time,
            timeout_at: start_time + Duration::milliseconds(max_execution_time_ms as i64),
        }
    }

    /// Whether the run-wide deadline has passed.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        Utc::now() > self.timeout_at
    }

    /// Merges a node's output object into `variables` so later nodes can
    /// reference its fields via `{{var}}` interpolation.
    pub fn merge_output(&mut self, output: &JsonValue) {
        if let JsonValue::Object(map) = output {
            for (key, value) in map {
                self.variables.insert(key.clone(), value.clone());
            }
        }
    }

    /// A combined view of node input plus run variables, used for
    /// interpolation and expression evaluation (input takes precedence).
    #[must_use]
    pub fn interpolation_scope(&self, input: &JsonValue) -> HashMap<String, JsonValue> {
        let mut scope = self.variables.clone();
        if let JsonValue::Object(map) = input {
            for (key, value) in map {
                scope.insert(key.clone(), value.clone());
            }
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            WorkflowRunId::new(),
            WorkflowId::new(),
            TenantId::new("acme").unwrap(),
            JsonValue::Null,
            TenantResources::default(),
            30_000,
        )
    }

    #[test]
    fn not_timed_out_immediately() {
        assert!(!context().is_timed_out());
    }

    #[test]
    fn merge_output_adds_variables() {
        let mut ctx = context();
        ctx.merge_output(&serde_json::json!({"status": "ok"}));
        assert_eq!(ctx.variables.get("status"), Some(&JsonValue::String("ok".to_string())));
    }

    #[test]
    fn interpolation_scope_prefers_input_over_variables() {
        let mut ctx = context();
        ctx.merge_output(&serde_json::json!({"flag": "from_variables"}));
        let scope = ctx.interpolation_scope(&serde_json::json!({"flag": "from_input"}));
        assert_eq!(scope.get("flag"), Some(&JsonValue::String("from_input".to_string())));
    }
}
