//! Error types for node execution and the traversal engine.
//!
//! Errors are designed for layered context: [`NodeExecutionError`] is
//! raised by a [`crate::executor::NodeExecutor`], [`EngineError`] wraps it
//! (plus graph and store/bus failures) with the run-level context needed
//! to terminate a run and record its `error.stepId`.

use meridian_graph::GraphError;
use std::fmt;

/// The taxonomy an error is classified into, used to decide retryability
/// and to group errors for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, unknown node kind, or a graph that failed validation.
    Validation,
    /// Resource (workflow, graph) could not be found.
    NotFound,
    /// Credential or token rejected by an external system.
    Authentication,
    /// Connection failure or 5xx from an external system.
    Network,
    /// A deadline (node or run) was exceeded.
    Timeout,
    /// A downstream integration reported a non-network failure.
    Integration,
    /// A store, queue, or event-bus failure internal to this engine.
    Internal,
    /// An edge-condition expression could not be evaluated; never fatal.
    ConditionEvaluation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Integration => "integration",
            Self::Internal => "internal",
            Self::ConditionEvaluation => "condition_evaluation",
        };
        write!(f, "{s}")
    }
}

/// A structured error raised while executing a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecutionError {
    /// A stable, machine-checkable code (e.g. `"TIMEOUT"`, `"HTTP_STATUS"`).
    pub code: String,
    /// A human-readable message.
    pub message: String,
    /// Additional structured context (response bodies, field names).
    pub details: serde_json::Value,
    /// Whether the node's retry policy should be consulted.
    pub retryable: bool,
    /// Which taxonomy bucket this error falls into.
    pub category: ErrorCategory,
}

impl NodeExecutionError {
    /// Constructs an error, defaulting `details` to `null`.
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
        category: ErrorCategory,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: serde_json::Value::Null,
            retryable,
            category,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// A non-retryable validation failure (bad input, unsupported kind).
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, false, ErrorCategory::Validation)
    }

    /// A retryable network/5xx failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new("NETWORK_ERROR", message, true, ErrorCategory::Network)
    }

    /// A retryable timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message, true, ErrorCategory::Timeout)
    }
}

impl fmt::Display for NodeExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for NodeExecutionError {}

/// An error produced during submission or store/bus access, independent of
/// any specific node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// A run with this id already exists (idempotent submit should return
    /// it rather than treat this as a failure).
    RunAlreadyExists,
    /// The referenced run does not exist.
    RunNotFound,
    /// A store, queue, or event-bus operation failed.
    Backend { message: String },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunAlreadyExists => write!(f, "run already exists"),
            Self::RunNotFound => write!(f, "run not found"),
            Self::Backend { message } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// The error recorded against a run when the engine terminates it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunError {
    /// A human-readable message.
    pub message: String,
    /// The node id whose failure caused the run to terminate, if any.
    pub step_id: Option<String>,
}

/// Top-level error from one pass of the traversal engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The workflow graph was not found in the repository.
    WorkflowNotFound,
    /// The graph failed validation.
    InvalidWorkflow(GraphError),
    /// A node failed in a way that terminates the run.
    NodeFailed { node_id: String, error: NodeExecutionError },
    /// A store, queue, or event-bus operation failed.
    Backend { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound => write!(f, "workflow not found"),
            Self::InvalidWorkflow(err) => write!(f, "invalid workflow: {err}"),
            Self::NodeFailed { node_id, error } => {
                write!(f, "node {node_id} failed: {error}")
            }
            Self::Backend { message } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        Self::InvalidWorkflow(err)
    }
}

impl EngineError {
    /// Renders this error as the `{message, stepId}` pair recorded on the
    /// run record.
    #[must_use]
    pub fn to_run_error(&self) -> RunError {
        match self {
            Self::WorkflowNotFound => RunError {
                message: "workflow not found".to_string(),
                step_id: None,
            },
            Self::InvalidWorkflow(err) => RunError {
                message: err.to_string(),
                step_id: None,
            },
            Self::NodeFailed { node_id, error } => RunError {
                message: error.message.clone(),
                step_id: Some(node_id.clone()),
            },
            Self::Backend { message } => RunError {
                message: message.clone(),
                step_id: None,
            },
        }
    }
}
