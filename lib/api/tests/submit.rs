//! End-to-end tests for the submit endpoint against in-memory fakes.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use meridian_api::{router, ApiConfig, AppState};
use meridian_core::{WorkflowId, WorkflowRunId};
use meridian_execution::ports::{EventBus, InsertOutcome, MeteringEvent, ProgressEvent, RunStore, StoreError};
use meridian_execution::Run;
use meridian_queue::{Delivery, QueueError, WorkItem, WorkQueue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct InMemoryRunStore {
    runs: Mutex<Vec<Run>>,
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_queued(&self, run: Run) -> Result<InsertOutcome, StoreError> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(existing) = runs.iter().find(|r| r.run_id == run.run_id) {
            return Ok(InsertOutcome::AlreadyExists(existing.clone()));
        }
        runs.push(run.clone());
        Ok(InsertOutcome::Inserted(run))
    }

    async fn get(&self, run_id: WorkflowRunId) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.lock().unwrap().iter().find(|r| r.run_id == run_id).cloned())
    }

    async fn mark_running(&self, _run_id: WorkflowRunId) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn mark_success(&self, _run_id: WorkflowRunId) -> Result<(), StoreError> {
        Ok(())
    }

    async fn mark_failed(&self, _run_id: WorkflowRunId, _error: meridian_execution::RunError) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryQueue {
    items: Mutex<Vec<WorkItem>>,
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn enqueue(&self, item: WorkItem, _retry_sequence: Option<u64>, _delay: Option<Duration>) -> Result<(), QueueError> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        Ok(None)
    }
}

#[derive(Default)]
struct InMemoryEventBus {
    metering: Mutex<Vec<MeteringEvent>>,
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_metering(&self, event: MeteringEvent) -> Result<(), StoreError> {
        self.metering.lock().unwrap().push(event);
        Ok(())
    }

    async fn publish_progress(&self, _event: ProgressEvent) -> Result<(), StoreError> {
        Ok(())
    }
}

fn submit_body(run_id: WorkflowRunId, workflow_id: WorkflowId) -> String {
    serde_json::json!({
        "runId": run_id,
        "workflowId": workflow_id,
        "tenantId": "acme",
        "payload": {"foo": "bar"},
    })
    .to_string()
}

#[tokio::test]
async fn submit_enqueues_and_emits_metering_on_first_call() {
    let run_store = Arc::new(InMemoryRunStore::default());
    let queue = Arc::new(InMemoryQueue::default());
    let events = Arc::new(InMemoryEventBus::default());
    let state = Arc::new(AppState::new(run_store, queue.clone(), events.clone(), ApiConfig::default()));
    let app = router(state);

    let run_id = WorkflowRunId::new();
    let workflow_id = WorkflowId::new();
    let request = Request::builder()
        .method("POST")
        .uri("/runs")
        .header("content-type", "application/json")
        .body(Body::from(submit_body(run_id, workflow_id)))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    assert_eq!(queue.items.lock().unwrap().len(), 1);
    assert_eq!(events.metering.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resubmitting_same_run_id_does_not_reenqueue() {
    let run_store = Arc::new(InMemoryRunStore::default());
    let queue = Arc::new(InMemoryQueue::default());
    let events = Arc::new(InMemoryEventBus::default());
    let state = Arc::new(AppState::new(run_store, queue.clone(), events.clone(), ApiConfig::default()));
    let app = router(state);

    let run_id = WorkflowRunId::new();
    let workflow_id = WorkflowId::new();

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/runs")
            .header("content-type", "application/json")
            .body(Body::from(submit_body(run_id, workflow_id)))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(queue.items.lock().unwrap().len(), 1);
    assert_eq!(events.metering.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_tenant_id_is_rejected_as_validation_error() {
    let run_store = Arc::new(InMemoryRunStore::default());
    let queue = Arc::new(InMemoryQueue::default());
    let events = Arc::new(InMemoryEventBus::default());
    let state = Arc::new(AppState::new(run_store, queue, events, ApiConfig::default()));
    let app = router(state);

    let body = serde_json::json!({
        "runId": WorkflowRunId::new(),
        "workflowId": WorkflowId::new(),
        "tenantId": "",
        "payload": {},
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/runs")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
