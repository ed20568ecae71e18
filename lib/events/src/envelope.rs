//! The wire envelope wrapped around every published event.
//!
//! Shaped like an EventBridge entry (`source`, `detailType`, `detail`,
//! `resources`) so a consumer can route on the envelope without
//! deserializing `detail` first.

use serde::Serialize;

const SOURCE_NAMESPACE: &str = "meridian.workflow.execution";

#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope<T> {
    pub source: String,
    #[serde(rename = "detailType")]
    pub detail_type: String,
    pub detail: T,
    pub resources: Vec<String>,
}

impl<T> EventEnvelope<T> {
    pub fn new(detail_type: impl Into<String>, detail: T, tenant_id: &str, workflow_id: &str, run_id: &str) -> Self {
        Self {
            source: SOURCE_NAMESPACE.to_string(),
            detail_type: detail_type.into(),
            detail,
            resources: vec![
                format!("tenant:{tenant_id}"),
                format!("workflow:{workflow_id}"),
                format!("run:{run_id}"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_resource_refs() {
        let envelope = EventEnvelope::new("Workflow Metering Event", serde_json::json!({"a": 1}), "acme", "wf_1", "run_1");
        assert_eq!(envelope.resources, vec!["tenant:acme", "workflow:wf_1", "run:run_1"]);
        assert_eq!(envelope.source, "meridian.workflow.execution");
    }
}
