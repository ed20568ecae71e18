//! Workflow graph definition types.
//!
//! A [`WorkflowGraph`] is the source of truth read from the workflow
//! repository: a versioned, tenant-owned set of nodes and edges plus the
//! execution-wide configuration that governs traversal.

use crate::edge::Edge;
use crate::node::{Node, NodeId, NodeKind};
use meridian_core::{TenantId, WorkflowId};
use serde::{Deserialize, Serialize};

/// What to do when a node fails and rollback is not triggered separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Stop traversal and fail the run.
    Stop,
    /// Skip the failing branch and continue with other ready nodes.
    Continue,
    /// Stop traversal, fail the run, and roll back completed nodes.
    Rollback,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        Self::Stop
    }
}

/// How much detail to record in the decision/audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// No audit trail beyond run/node state.
    None,
    /// Record node transitions only.
    Basic,
    /// Record node transitions plus input/output snapshots.
    Full,
}

impl Default for AuditLevel {
    fn default() -> Self {
        Self::Basic
    }
}

/// Execution-wide configuration carried by a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Run-wide deadline; individual node timeouts still apply within it.
    pub max_execution_time_ms: u64,
    /// Upper bound on nodes executing concurrently within one run.
    pub max_concurrent_nodes: usize,
    /// What to do when a node fails.
    pub error_strategy: ErrorStrategy,
    /// Whether a failed run triggers compensating actions (§rollback).
    pub enable_rollback: bool,
    /// Audit trail verbosity.
    pub audit_level: AuditLevel,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 300_000,
            max_concurrent_nodes: 4,
            error_strategy: ErrorStrategy::Stop,
            enable_rollback: false,
            audit_level: AuditLevel::Basic,
        }
    }
}

/// A complete, versioned workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// The workflow this graph is a version of.
    pub workflow_id: WorkflowId,
    /// Semantic version of this graph definition.
    pub version: String,
    /// The tenant that owns this workflow.
    pub tenant_id: TenantId,
    /// The graph's nodes.
    pub nodes: Vec<Node>,
    /// The graph's edges.
    pub edges: Vec<Edge>,
    /// Execution-wide configuration.
    #[serde(default)]
    pub config: GraphConfig,
}

impl WorkflowGraph {
    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Finds a node by id.
    #[must_use]
    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Returns the id of the sole `START` node, if exactly one exists.
    #[must_use]
    pub fn start_node_id(&self) -> Option<&NodeId> {
        let mut starts = self.nodes.iter().filter(|n| matches!(n.kind, NodeKind::Start));
        let first = starts.next()?;
        if starts.next().is_some() {
            return None;
        }
        Some(&first.id)
    }

    /// Returns the outgoing edges of a node.
    pub fn outgoing_edges(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.from_node_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn sample() -> WorkflowGraph {
        WorkflowGraph {
            workflow_id: WorkflowId::new(),
            version: "1.0.0".to_string(),
            tenant_id: TenantId::new("acme").unwrap(),
            nodes: vec![Node::new("START", NodeKind::Start), Node::new("END", NodeKind::End)],
            edges: vec![Edge::new("START", "END")],
            config: GraphConfig::default(),
        }
    }

    #[test]
    fn finds_single_start_node() {
        let graph = sample();
        assert_eq!(graph.start_node_id().unwrap().as_str(), "START");
    }

    #[test]
    fn no_start_node_id_when_duplicated() {
        let mut graph = sample();
        graph.nodes.push(Node::new("START2", NodeKind::Start));
        assert!(graph.start_node_id().is_none());
    }

    #[test]
    fn outgoing_edges_filters_by_source() {
        let graph = sample();
        let out: Vec<_> = graph.outgoing_edges(&NodeId::new("START")).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_node_id.as_str(), "END");
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.max_concurrent_nodes, 4);
        assert!(!config.enable_rollback);
    }
}
