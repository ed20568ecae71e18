//! Workflow node types and configurations.
//!
//! A node's `id` is author-chosen (it appears verbatim in workflow
//! definitions authored outside this engine), so unlike the ULID-based
//! identifiers in `meridian-core`, [`NodeId`] wraps a plain string rather
//! than minting its own value.

use meridian_core::IntegrationAccountId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// A node identifier as it appears in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the node id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Backoff shape applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always wait `delay_ms`.
    Fixed,
    /// Wait `delay_ms * attempt`.
    Linear,
    /// Wait `delay_ms * 2^(attempt-1)`.
    Exponential,
}

/// Retry configuration attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first. `1` means no retries.
    pub max_attempts: u32,
    /// Shape of the delay between attempts.
    pub backoff: BackoffStrategy,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
    /// Whether to add up to 1s of random jitter to each computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::Fixed,
            delay_ms: 1_000,
            jitter: false,
        }
    }
}

/// A named data transform applied by a `DATA_TRANSFORM` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Upper-cases every string value in the input map.
    Uppercase,
    /// Lower-cases every string value in the input map.
    Lowercase,
    /// Adds a `timestamp` field to the input map.
    AddTimestamp,
    /// Returns the input unchanged.
    PassThrough,
}

impl Default for TransformKind {
    fn default() -> Self {
        Self::PassThrough
    }
}

/// Parameters for dispatching an operation to a third-party integration
/// (Google Workspace, Microsoft 365, Salesforce). The engine only validates
/// and forwards this payload; the concrete provider call is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOperation {
    /// Which connected account to dispatch through, if more than one exists
    /// for the tenant.
    pub account_id: Option<IntegrationAccountId>,
    /// Provider-defined operation name (e.g. `"calendar.create_event"`).
    pub operation: String,
    /// Operation parameters, interpolated from input/variables before dispatch.
    #[serde(default)]
    pub params: JsonValue,
}

/// Parameters for a user-lifecycle node (provision, deprovision, license
/// assign/revoke).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserManagementOperation {
    /// The directory/user identifier the operation targets.
    pub user_id: String,
    /// Operation-specific parameters (e.g. license SKU, group memberships).
    #[serde(default)]
    pub params: JsonValue,
}

/// The closed set of node kinds this engine knows how to dispatch.
///
/// Any `type` tag not listed here deserializes into [`NodeKind::Unknown`]
/// rather than failing outright, so that graph validation (not JSON
/// parsing) is the place an unsupported node kind is rejected, with a
/// stable error code callers can rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Marks the single entry point of a graph.
    Start,
    /// Marks a terminal node; traversal does not descend past it.
    End,
    /// Evaluates an edge-condition expression and returns its boolean result.
    Condition {
        /// `{{var}} == "literal"` or `{{var}} != "literal"`, after
        /// interpolation from node input then run variables.
        expression: String,
    },
    /// Marks a fan-out point for concurrent sibling branches.
    Parallel,
    /// Sleeps for a fixed duration before continuing.
    Delay {
        /// Sleep duration in milliseconds.
        delay_ms: u64,
    },
    /// Performs an HTTP request.
    ApiCall {
        /// Request URL, with `{{var}}` interpolation.
        url: String,
        /// HTTP method; defaults to `GET`.
        #[serde(default)]
        method: Option<String>,
        /// Request headers, with `{{var}}` interpolation in values.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// JSON request body, if any.
        #[serde(default)]
        body: Option<JsonValue>,
    },
    /// Performs an HTTP POST carrying the node's input as the event payload.
    Webhook {
        /// Destination URL, with `{{var}}` interpolation.
        url: String,
    },
    /// Sends an email.
    Email {
        /// Recipient address.
        to: String,
        /// Subject line.
        subject: String,
        /// Message body.
        #[serde(default)]
        body: Option<String>,
    },
    /// Applies a named transform to the node's input.
    DataTransform {
        /// Which transform to apply.
        #[serde(default)]
        transform: TransformKind,
    },
    /// Dispatches an operation to a Google Workspace account.
    GoogleWorkspace(IntegrationOperation),
    /// Dispatches an operation to a Microsoft 365 account.
    Microsoft365(IntegrationOperation),
    /// Dispatches an operation to Salesforce.
    Salesforce(IntegrationOperation),
    /// Provisions a user account.
    UserProvision(UserManagementOperation),
    /// Deprovisions a user account.
    UserDeprovision(UserManagementOperation),
    /// Assigns a license to a user.
    LicenseAssign(UserManagementOperation),
    /// Revokes a license from a user.
    LicenseRevoke(UserManagementOperation),
    /// Catch-all for any `type` tag outside the closed set above.
    #[serde(other)]
    Unknown,
}

impl NodeKind {
    /// A short, stable name for logging and error codes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Condition { .. } => "CONDITION",
            Self::Parallel => "PARALLEL",
            Self::Delay { .. } => "DELAY",
            Self::ApiCall { .. } => "API_CALL",
            Self::Webhook { .. } => "WEBHOOK",
            Self::Email { .. } => "EMAIL",
            Self::DataTransform { .. } => "DATA_TRANSFORM",
            Self::GoogleWorkspace(_) => "GOOGLE_WORKSPACE",
            Self::Microsoft365(_) => "MICROSOFT365",
            Self::Salesforce(_) => "SALESFORCE",
            Self::UserProvision(_) => "USER_PROVISION",
            Self::UserDeprovision(_) => "USER_DEPROVISION",
            Self::LicenseAssign(_) => "LICENSE_ASSIGN",
            Self::LicenseRevoke(_) => "LICENSE_REVOKE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether traversal should stop descending past a node of this kind.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The node's id, unique within its graph.
    pub id: NodeId,
    /// What this node does when executed.
    pub kind: NodeKind,
    /// Retry policy for this node's execution.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-node execution timeout; falls back to the graph default.
    #[serde(default)]
    pub max_execution_time_ms: Option<u64>,
    /// Display-only coordinates; ignored by execution.
    #[serde(default)]
    pub position: Option<(f64, f64)>,
}

impl Node {
    /// Creates a node with default retry/timeout/position.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            retry: RetryConfig::default(),
            max_execution_time_ms: None,
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        let id = NodeId::new("A");
        assert_eq!(id.to_string(), "A");
    }

    #[test]
    fn retry_config_default() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.backoff, BackoffStrategy::Fixed);
    }

    #[test]
    fn node_kind_name() {
        assert_eq!(NodeKind::Start.name(), "START");
        assert_eq!(NodeKind::Delay { delay_ms: 10 }.name(), "DELAY");
    }

    #[test]
    fn unknown_kind_does_not_fail_deserialization() {
        let json = r#"{"type":"SOMETHING_MADE_UP"}"#;
        let kind: NodeKind = serde_json::from_str(json).expect("deserialize");
        assert_eq!(kind, NodeKind::Unknown);
    }

    #[test]
    fn api_call_roundtrip() {
        let node = Node::new(
            "A",
            NodeKind::ApiCall {
                url: "https://example.com/{{id}}".to_string(),
                method: Some("POST".to_string()),
                headers: HashMap::new(),
                body: None,
            },
        );
        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }
}
