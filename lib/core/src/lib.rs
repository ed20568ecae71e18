//! Core domain identifiers and error handling for the workflow execution engine.
//!
//! This crate provides the foundational identifier types and the shared
//! `Result` alias used throughout the engine's crates. It intentionally
//! carries no domain logic: graph structure lives in `meridian-graph`,
//! execution semantics in `meridian-execution`, and persistence in
//! `meridian-store` / `meridian-queue` / `meridian-events`.

pub mod envelope;
pub mod error;
pub mod id;

pub use envelope::{Envelope, RawEnvelope};
pub use error::Result;
pub use id::{IntegrationAccountId, InvalidTenantId, ParseIdError, TenantId, WorkflowId, WorkflowRunId};
