//! NATS core publish/subscribe [`EventBus`].
//!
//! Uses plain `client.publish`, not JetStream: metering and progress events
//! are best-effort, and downstream consumers are assumed idempotent, so
//! there is nothing durability buys here that is worth the extra
//! infrastructure.

use crate::envelope::EventEnvelope;
use crate::error::EventBusError;
use async_trait::async_trait;
use meridian_execution::ports::{EventBus, MeteringEvent, ProgressEvent, StoreError};

const METERING_SUBJECT_PREFIX: &str = "workflow.metering";
const PROGRESS_SUBJECT_PREFIX: &str = "workflow.progress";

fn metering_identity(event: &MeteringEvent) -> (&str, &str, &str, &'static str) {
    match event {
        MeteringEvent::TaskEnqueued { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "task_enqueued")
        }
        MeteringEvent::TaskStarted { tenant_id, workflow_id, run_id } => {
            (tenant_id, workflow_id, run_id, "task_started")
        }
        MeteringEvent::TaskCompleted { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "task_completed")
        }
        MeteringEvent::TaskFailed { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "task_failed")
        }
    }
}

fn progress_identity(event: &ProgressEvent) -> (&str, &str, &str, &'static str) {
    match event {
        ProgressEvent::NodeStarted { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "node_started")
        }
        ProgressEvent::NodeCompleted { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "node_completed")
        }
        ProgressEvent::NodeFailed { tenant_id, workflow_id, run_id, .. } => {
            (tenant_id, workflow_id, run_id, "node_failed")
        }
    }
}

/// [`EventBus`] backed by a plain NATS client connection.
pub struct NatsEventBus {
    client: async_nats::Client,
}

impl NatsEventBus {
    /// Connects to NATS at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self, EventBusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| EventBusError::ConnectionFailed { message: e.to_string() })?;
        Ok(Self { client })
    }

    async fn publish_envelope<T: serde::Serialize>(
        &self,
        subject: String,
        envelope: EventEnvelope<T>,
    ) -> Result<(), EventBusError> {
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| EventBusError::PublishFailed { message: format!("failed to serialize event: {e}") })?;
        self.client
            .publish(subject, bytes.into())
            .await
            .map_err(|e| EventBusError::PublishFailed { message: e.to_string() })
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish_metering(&self, event: MeteringEvent) -> Result<(), StoreError> {
        let (tenant_id, workflow_id, run_id, event_type) = metering_identity(&event);
        let subject = format!("{METERING_SUBJECT_PREFIX}.{tenant_id}.{event_type}");
        let envelope = EventEnvelope::new("Workflow Metering Event", event, tenant_id, workflow_id, run_id);
        self.publish_envelope(subject, envelope).await.map_err(Into::into)
    }

    async fn publish_progress(&self, event: ProgressEvent) -> Result<(), StoreError> {
        let (tenant_id, workflow_id, run_id, event_type) = progress_identity(&event);
        let subject = format!("{PROGRESS_SUBJECT_PREFIX}.{tenant_id}.{event_type}");
        let envelope = EventEnvelope::new("Workflow Progress Event", event, tenant_id, workflow_id, run_id);
        self.publish_envelope(subject, envelope).await.map_err(Into::into)
    }
}
