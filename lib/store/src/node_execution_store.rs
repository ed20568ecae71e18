//! PostgreSQL-backed [`NodeExecutionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::WorkflowRunId;
use meridian_execution::error::{ErrorCategory, NodeExecutionError};
use meridian_execution::ports::{NodeExecutionStore, StoreError};
use meridian_execution::{NodeExecution, NodeExecutionStatus, ResourceUsage};
use meridian_graph::NodeId;
use sqlx::{FromRow, PgPool};

fn status_as_str(status: NodeExecutionStatus) -> &'static str {
    match status {
        NodeExecutionStatus::Pending => "PENDING",
        NodeExecutionStatus::Running => "RUNNING",
        NodeExecutionStatus::Success => "SUCCESS",
        NodeExecutionStatus::Failed => "FAILED",
        NodeExecutionStatus::Skipped => "SKIPPED",
        NodeExecutionStatus::Retrying => "RETRYING",
    }
}

fn status_from_str(s: &str) -> NodeExecutionStatus {
    match s {
        "RUNNING" => NodeExecutionStatus::Running,
        "SUCCESS" => NodeExecutionStatus::Success,
        "FAILED" => NodeExecutionStatus::Failed,
        "SKIPPED" => NodeExecutionStatus::Skipped,
        "RETRYING" => NodeExecutionStatus::Retrying,
        _ => NodeExecutionStatus::Pending,
    }
}

fn category_as_str(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Validation => "VALIDATION",
        ErrorCategory::NotFound => "NOT_FOUND",
        ErrorCategory::Authentication => "AUTHENTICATION",
        ErrorCategory::Network => "NETWORK",
        ErrorCategory::Timeout => "TIMEOUT",
        ErrorCategory::Integration => "INTEGRATION",
        ErrorCategory::Internal => "INTERNAL",
        ErrorCategory::ConditionEvaluation => "CONDITION_EVALUATION",
    }
}

fn category_from_str(s: &str) -> ErrorCategory {
    match s {
        "NOT_FOUND" => ErrorCategory::NotFound,
        "AUTHENTICATION" => ErrorCategory::Authentication,
        "NETWORK" => ErrorCategory::Network,
        "TIMEOUT" => ErrorCategory::Timeout,
        "INTEGRATION" => ErrorCategory::Integration,
        "INTERNAL" => ErrorCategory::Internal,
        "CONDITION_EVALUATION" => ErrorCategory::ConditionEvaluation,
        _ => ErrorCategory::Validation,
    }
}

fn decode_err(column: &str, value: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} '{value}': {reason}"),
    )))
}

#[derive(FromRow)]
struct NodeExecutionRow {
    run_id: String,
    node_id: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    input: serde_json::Value,
    output: Option<serde_json::Value>,
    error_code: Option<String>,
    error_message: Option<String>,
    error_details: Option<serde_json::Value>,
    error_retryable: Option<bool>,
    error_category: Option<String>,
    retry_count: i32,
    execution_time_ms: Option<i64>,
    resource_wall_time_ms: Option<i64>,
}

impl NodeExecutionRow {
    fn try_into_record(self) -> Result<NodeExecution, sqlx::Error> {
        use std::str::FromStr;
        let run_id = WorkflowRunId::from_str(&self.run_id)
            .map_err(|e| decode_err("run_id", &self.run_id, e))?;
        let error = self.error_code.map(|code| NodeExecutionError {
            code,
            message: self.error_message.unwrap_or_default(),
            details: self.error_details.unwrap_or(serde_json::Value::Null),
            retryable: self.error_retryable.unwrap_or(false),
            category: self.error_category.as_deref().map(category_from_str).unwrap_or(ErrorCategory::Internal),
        });
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|e| decode_err("retry_count", &self.retry_count.to_string(), e))?;

        Ok(NodeExecution {
            run_id,
            node_id: NodeId::new(self.node_id),
            status: status_from_str(&self.status),
            started_at: self.started_at,
            finished_at: self.finished_at,
            input: self.input,
            output: self.output,
            error,
            retry_count,
            execution_time_ms: self.execution_time_ms.map(|v| v as u64),
            resource_usage: self.resource_wall_time_ms.map(|v| ResourceUsage { wall_time_ms: v as u64 }),
        })
    }
}

/// [`NodeExecutionStore`] backed by a `node_executions` table in PostgreSQL,
/// keyed by `(run_id, node_id)`.
pub struct PgNodeExecutionStore {
    pool: PgPool,
}

impl PgNodeExecutionStore {
    /// Wraps an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn to_store_err(err: sqlx::Error) -> StoreError {
        StoreError(err.to_string())
    }
}

#[async_trait]
impl NodeExecutionStore for PgNodeExecutionStore {
    async fn upsert(&self, record: NodeExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO node_executions
                (run_id, node_id, status, started_at, finished_at, input, output,
                 error_code, error_message, error_details, error_retryable, error_category,
                 retry_count, execution_time_ms, resource_wall_time_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (run_id, node_id) DO UPDATE SET
                status = $3, started_at = $4, finished_at = $5, input = $6, output = $7,
                error_code = $8, error_message = $9, error_details = $10,
                error_retryable = $11, error_category = $12,
                retry_count = $13, execution_time_ms = $14, resource_wall_time_ms = $15
            "#,
        )
        .bind(record.run_id.to_string())
        .bind(record.node_id.as_str())
        .bind(status_as_str(record.status))
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.input)
        .bind(&record.output)
        .bind(record.error.as_ref().map(|e| e.code.clone()))
        .bind(record.error.as_ref().map(|e| e.message.clone()))
        .bind(record.error.as_ref().map(|e| e.details.clone()))
        .bind(record.error.as_ref().map(|e| e.retryable))
        .bind(record.error.as_ref().map(|e| category_as_str(e.category).to_string()))
        .bind(i32::try_from(record.retry_count).unwrap_or(i32::MAX))
        .bind(record.execution_time_ms.map(|v| v as i64))
        .bind(record.resource_usage.map(|r| r.wall_time_ms as i64))
        .execute(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        Ok(())
    }

    async fn get(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<Option<NodeExecution>, StoreError> {
        let row: Option<NodeExecutionRow> = sqlx::query_as(
            r#"
            SELECT run_id, node_id, status, started_at, finished_at, input, output,
                   error_code, error_message, error_details, error_retryable, error_category,
                   retry_count, execution_time_ms, resource_wall_time_ms
            FROM node_executions
            WHERE run_id = $1 AND node_id = $2
            "#,
        )
        .bind(run_id.to_string())
        .bind(node_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        row.map(NodeExecutionRow::try_into_record).transpose().map_err(Self::to_store_err)
    }

    async fn list_for_run(&self, run_id: WorkflowRunId) -> Result<Vec<NodeExecution>, StoreError> {
        let rows: Vec<NodeExecutionRow> = sqlx::query_as(
            r#"
            SELECT run_id, node_id, status, started_at, finished_at, input, output,
                   error_code, error_message, error_details, error_retryable, error_category,
                   retry_count, execution_time_ms, resource_wall_time_ms
            FROM node_executions
            WHERE run_id = $1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        rows.into_iter().map(NodeExecutionRow::try_into_record).collect::<Result<Vec<_>, _>>().map_err(Self::to_store_err)
    }

    async fn increment_retry(&self, run_id: WorkflowRunId, node_id: &NodeId) -> Result<u32, StoreError> {
        let (retry_count,): (i32,) = sqlx::query_as(
            r#"
            UPDATE node_executions
            SET retry_count = retry_count + 1
            WHERE run_id = $1 AND node_id = $2
            RETURNING retry_count
            "#,
        )
        .bind(run_id.to_string())
        .bind(node_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        u32::try_from(retry_count).map_err(|e| StoreError(e.to_string()))
    }
}
