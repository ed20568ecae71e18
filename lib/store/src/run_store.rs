//! PostgreSQL-backed [`RunStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{TenantId, WorkflowId, WorkflowRunId};
use meridian_execution::ports::{InsertOutcome, RunStore, StoreError};
use meridian_execution::{Run, RunError, RunStatus};
use meridian_graph::NodeId;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

fn status_as_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "QUEUED",
        RunStatus::Running => "RUNNING",
        RunStatus::Success => "SUCCESS",
        RunStatus::Failed => "FAILED",
    }
}

fn status_from_str(s: &str) -> RunStatus {
    match s {
        "RUNNING" => RunStatus::Running,
        "SUCCESS" => RunStatus::Success,
        "FAILED" => RunStatus::Failed,
        _ => RunStatus::Queued,
    }
}

fn decode_err(column: &str, value: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} '{value}': {reason}"),
    )))
}

#[derive(FromRow)]
struct RunRow {
    run_id: String,
    workflow_id: String,
    tenant_id: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    start_node_id: Option<String>,
    payload: serde_json::Value,
    error_message: Option<String>,
    error_step_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    retention_deadline: DateTime<Utc>,
}

impl RunRow {
    fn try_into_run(self) -> Result<Run, sqlx::Error> {
        let run_id = WorkflowRunId::from_str(&self.run_id)
            .map_err(|e| decode_err("run_id", &self.run_id, e))?;
        let workflow_id = WorkflowId::from_str(&self.workflow_id)
            .map_err(|e| decode_err("workflow_id", &self.workflow_id, e))?;
        let tenant_id = TenantId::new(self.tenant_id.clone())
            .map_err(|e| decode_err("tenant_id", &self.tenant_id, e))?;
        let error = self.error_message.map(|message| RunError { message, step_id: self.error_step_id });

        Ok(Run {
            run_id,
            workflow_id,
            tenant_id,
            status: status_from_str(&self.status),
            started_at: self.started_at,
            finished_at: self.finished_at,
            start_node_id: self.start_node_id.map(|s| NodeId::new(s)),
            payload: self.payload,
            error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            retention_deadline: self.retention_deadline,
        })
    }
}

/// [`RunStore`] backed by a `runs` table in PostgreSQL.
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    /// Wraps an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn to_store_err(err: sqlx::Error) -> StoreError {
        StoreError(err.to_string())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn insert_queued(&self, run: Run) -> Result<InsertOutcome, StoreError> {
        let inserted: Option<RunRow> = sqlx::query_as(
            r#"
            INSERT INTO runs
                (run_id, workflow_id, tenant_id, status, started_at, finished_at,
                 start_node_id, payload, error_message, error_step_id,
                 created_at, updated_at, retention_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (run_id) DO NOTHING
            RETURNING run_id, workflow_id, tenant_id, status, started_at, finished_at,
                      start_node_id, payload, error_message, error_step_id,
                      created_at, updated_at, retention_deadline
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.tenant_id.as_str())
        .bind(status_as_str(run.status))
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.start_node_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&run.payload)
        .bind(run.error.as_ref().map(|e| e.message.clone()))
        .bind(run.error.as_ref().and_then(|e| e.step_id.clone()))
        .bind(run.created_at)
        .bind(run.updated_at)
        .bind(run.retention_deadline)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        match inserted {
            Some(_) => Ok(InsertOutcome::Inserted(run)),
            None => {
                let existing = self.get(run.run_id).await?.ok_or_else(|| {
                    StoreError("conflicting insert but no existing row found".to_string())
                })?;
                Ok(InsertOutcome::AlreadyExists(existing))
            }
        }
    }

    async fn get(&self, run_id: WorkflowRunId) -> Result<Option<Run>, StoreError> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT run_id, workflow_id, tenant_id, status, started_at, finished_at,
                   start_node_id, payload, error_message, error_step_id,
                   created_at, updated_at, retention_deadline
            FROM runs
            WHERE run_id = $1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        row.map(RunRow::try_into_run).transpose().map_err(Self::to_store_err)
    }

    async fn mark_running(&self, run_id: WorkflowRunId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = 'RUNNING', updated_at = NOW()
            WHERE run_id = $1 AND status = 'QUEUED'
            "#,
        )
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_success(&self, run_id: WorkflowRunId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE runs
            SET status = 'SUCCESS', finished_at = NOW(), updated_at = NOW()
            WHERE run_id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        Ok(())
    }

    async fn mark_failed(&self, run_id: WorkflowRunId, error: RunError) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE runs
            SET status = 'FAILED', finished_at = NOW(), updated_at = NOW(),
                error_message = $2, error_step_id = $3
            WHERE run_id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(run_id.to_string())
        .bind(&error.message)
        .bind(&error.step_id)
        .execute(&self.pool)
        .await
        .map_err(Self::to_store_err)?;

        Ok(())
    }
}
