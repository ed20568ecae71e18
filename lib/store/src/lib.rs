//! PostgreSQL adapters for the ports defined in `meridian-execution`.
//!
//! Each store mirrors its record type's shape as a `FromRow` row, converting
//! through `try_into_*` so a decode failure carries the offending column
//! rather than panicking. Queries are built with runtime `query`/`query_as`
//! (no `query_as!`/`query!` macros), so this crate compiles without a live
//! database.

pub mod node_execution_store;
pub mod run_store;
pub mod workflow_repository;

pub use node_execution_store::PgNodeExecutionStore;
pub use run_store::PgRunStore;
pub use workflow_repository::PgWorkflowRepository;
