//! Workflow graph model, validation, and execution planning.
//!
//! This crate provides:
//!
//! - **Graph Model**: nodes, edges, and the closed set of node kinds this
//!   engine can dispatch.
//! - **Graph Builder**: cycle detection, deterministic topological
//!   ordering, and parallel-group identification via `petgraph`.
//! - **Expressions**: the `{{var}}` interpolation and `==`/`!=` comparison
//!   grammar used by edge conditions and node configuration.

pub mod definition;
pub mod edge;
pub mod error;
pub mod expr;
pub mod graph;
pub mod node;

pub use definition::{AuditLevel, ErrorStrategy, GraphConfig, WorkflowGraph};
pub use edge::{Edge, EdgeCondition};
pub use error::GraphError;
pub use graph::{ExecutionPlan, GraphBuilder, PlannedNode};
pub use node::{
    BackoffStrategy, IntegrationOperation, Node, NodeId, NodeKind, RetryConfig, TransformKind,
    UserManagementOperation,
};
