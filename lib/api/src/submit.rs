//! `POST /runs` — idempotent run submission.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use meridian_core::{TenantId, WorkflowId, WorkflowRunId};
use meridian_execution::ports::{InsertOutcome, MeteringEvent};
use meridian_execution::{Run, RunStatus};
use meridian_graph::NodeId;
use meridian_queue::WorkItem;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use ulid::Ulid;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub run_id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub tenant_id: String,
    #[serde(default)]
    pub start_node_id: Option<NodeId>,
    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct RunStatusView {
    pub run_id: WorkflowRunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<meridian_execution::RunError>,
}

impl From<Run> for RunStatusView {
    fn from(run: Run) -> Self {
        Self { run_id: run.run_id, status: run.status, started_at: run.started_at, finished_at: run.finished_at, error: run.error }
    }
}

fn payload_size(payload: &JsonValue) -> usize {
    serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(0)
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = TenantId::new(request.tenant_id)
        .map_err(|_| ApiError::field("tenantId", "must not be empty"))?;

    let size = payload_size(&request.payload);
    if size > state.config.max_payload_bytes {
        return Err(ApiError::field(
            "payload",
            format!("exceeds maximum size of {} bytes", state.config.max_payload_bytes),
        ));
    }

    let run = Run::new_queued(
        request.run_id,
        request.workflow_id,
        tenant_id.clone(),
        request.start_node_id.clone(),
        request.payload.clone(),
    );

    let outcome = state.run_store.insert_queued(run).await?;

    let request_id = Ulid::new().to_string();
    let (run, newly_inserted) = match outcome {
        InsertOutcome::Inserted(run) => (run, true),
        InsertOutcome::AlreadyExists(run) => (run, false),
    };

    if newly_inserted {
        let item = WorkItem::new(run.run_id, run.workflow_id, tenant_id.clone(), run.start_node_id.clone(), run.payload.clone());
        state.queue.enqueue(item, None, None).await?;

        state
            .events
            .publish_metering(MeteringEvent::TaskEnqueued {
                tenant_id: tenant_id.as_str().to_string(),
                workflow_id: run.workflow_id.to_string(),
                run_id: run.run_id.to_string(),
                payload_size_bytes: size,
                has_start_node: run.start_node_id.is_some(),
            })
            .await?;
    }

    let mut response = Json(RunStatusView::from(run)).into_response();
    response
        .headers_mut()
        .insert("X-Request-ID", HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_counts_serialized_bytes() {
        let payload = serde_json::json!({"a": 1});
        assert!(payload_size(&payload) > 0);
    }
}
