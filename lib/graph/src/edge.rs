//! Edge types for workflow graphs.
//!
//! Edges connect nodes and optionally gate traversal on the upstream node's
//! outcome or output.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// The condition under which an edge is followed during traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Followed only when the upstream node succeeded.
    Success,
    /// Followed only when the upstream node failed.
    Failure,
    /// Always followed, regardless of outcome.
    Always,
    /// Followed when an interpolated `==`/`!=` comparison evaluates true.
    Expression {
        /// `{{var}} == "literal"` or `{{var}} != "literal"`.
        expression: String,
    },
}

/// An edge connecting two nodes in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The upstream node id.
    pub from_node_id: NodeId,
    /// The downstream node id.
    pub to_node_id: NodeId,
    /// The condition gating traversal; `None` behaves like `Always`.
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    /// Creates an unconditional edge.
    pub fn new(from_node_id: impl Into<NodeId>, to_node_id: impl Into<NodeId>) -> Self {
        Self {
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
            condition: None,
        }
    }

    /// Creates an edge gated on the given condition.
    pub fn with_condition(
        from_node_id: impl Into<NodeId>,
        to_node_id: impl Into<NodeId>,
        condition: EdgeCondition,
    ) -> Self {
        Self {
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
            condition: Some(condition),
        }
    }

    /// A relative weight used only for duration estimation, never for
    /// correctness.
    #[must_use]
    pub fn estimation_weight(&self) -> f64 {
        match &self.condition {
            None => 0.5,
            Some(EdgeCondition::Always) => 0.5,
            Some(EdgeCondition::Success) => 1.0,
            Some(EdgeCondition::Failure) => 1.5,
            Some(EdgeCondition::Expression { .. }) => 2.0,
        }
    }
}
