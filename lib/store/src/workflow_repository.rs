//! PostgreSQL-backed [`WorkflowRepository`].
//!
//! Graphs are stored as a single `graph_data` JSONB column holding the
//! serialized [`WorkflowGraph`], the same shape the teacher's
//! `WorkflowRecord::graph_data` field uses, rather than normalizing nodes
//! and edges into their own tables.

use async_trait::async_trait;
use meridian_core::WorkflowId;
use meridian_execution::ports::{RepositoryError, WorkflowRepository};
use meridian_graph::WorkflowGraph;
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct GraphRow {
    graph_data: serde_json::Value,
}

/// [`WorkflowRepository`] backed by a `workflow_graphs` table, keyed by
/// `(workflow_id, version)`.
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    /// Wraps an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn get_graph(
        &self,
        workflow_id: WorkflowId,
        version: Option<&str>,
    ) -> Result<WorkflowGraph, RepositoryError> {
        let row: Option<GraphRow> = match version {
            Some(version) => sqlx::query_as(
                r#"
                SELECT graph_data
                FROM workflow_graphs
                WHERE workflow_id = $1 AND version = $2
                "#,
            )
            .bind(workflow_id.to_string())
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?,
            None => sqlx::query_as(
                r#"
                SELECT graph_data
                FROM workflow_graphs
                WHERE workflow_id = $1
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(workflow_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?,
        };

        let row = row.ok_or(RepositoryError::NotFound)?;
        serde_json::from_value(row.graph_data)
            .map_err(|e| RepositoryError::Backend(format!("corrupt graph_data: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::TenantId;
    use meridian_graph::{Edge, GraphConfig, Node, NodeKind};

    #[test]
    fn graph_round_trips_through_json() {
        let graph = WorkflowGraph {
            workflow_id: WorkflowId::new(),
            version: "1.0.0".to_string(),
            tenant_id: TenantId::new("acme").unwrap(),
            nodes: vec![Node::new("START", NodeKind::Start), Node::new("END", NodeKind::End)],
            edges: vec![Edge::new("START", "END")],
            config: GraphConfig::default(),
        };
        let value = serde_json::to_value(&graph).unwrap();
        let round_tripped: WorkflowGraph = serde_json::from_value(value).unwrap();
        assert_eq!(round_tripped, graph);
    }
}
