//! Run and node-execution state machines, retry and rollback semantics,
//! the node-executor contract, and the traversal engine that drives a run
//! from `QUEUED` to a terminal status.
//!
//! This crate defines the ports (`RunStore`, `NodeExecutionStore`,
//! `WorkflowRepository`, `EventBus`) that concrete adapters implement; it
//! has no knowledge of Postgres, NATS, or any other backend.

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod node_execution;
pub mod ports;
pub mod retry;
pub mod rollback;
pub mod run;

pub use context::{ExecutionContext, TenantResources};
pub use engine::Engine;
pub use error::{EngineError, ErrorCategory, ExecutionError, NodeExecutionError, RunError};
pub use executor::{DefaultNodeExecutor, NodeExecutor};
pub use node_execution::{NodeExecution, NodeExecutionStatus, ResourceUsage};
pub use ports::{
    EventBus, InsertOutcome, MeteringEvent, NodeExecutionStore, ProgressEvent, RepositoryError,
    RunStore, StoreError, WorkflowRepository,
};
pub use retry::compute_delay;
pub use rollback::{rollback, NoopRollbackHandler, RollbackHandler};
pub use run::{Run, RunStatus};
