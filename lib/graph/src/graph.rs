//! Graph validation and execution planning.
//!
//! [`GraphBuilder::build`] is a pure function: given a [`WorkflowGraph`], it
//! either rejects it with a stable [`GraphError`] or produces an
//! [`ExecutionPlan`] describing adjacency, a deterministic topological
//! order, and the parallel groups a traversal may dispatch concurrently.

use crate::definition::WorkflowGraph;
use crate::edge::EdgeCondition;
use crate::error::GraphError;
use crate::node::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A node augmented with the structural facts the execution engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    /// The node's id.
    pub id: NodeId,
    /// Number of incoming edges.
    pub in_degree: usize,
    /// Number of outgoing edges.
    pub out_degree: usize,
    /// Longest-path distance from `START`; nodes at the same level have no
    /// path between them and may be dispatched concurrently.
    pub level: usize,
}

/// The validated, plannable form of a [`WorkflowGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Every node, augmented with degree and level.
    pub nodes: Vec<PlannedNode>,
    /// A deterministic topological order over node ids.
    pub order: Vec<NodeId>,
    /// Nodes grouped by level; each inner vec may run concurrently.
    pub parallel_groups: Vec<Vec<NodeId>>,
    /// Total number of nodes.
    pub total_tasks: usize,
    /// Size of the largest parallel group.
    pub parallelization_level: usize,
}

impl ExecutionPlan {
    /// Returns the reverse of the topological order, for rollback.
    #[must_use]
    pub fn reverse_order(&self) -> Vec<NodeId> {
        let mut order = self.order.clone();
        order.reverse();
        order
    }
}

const DEFAULT_NODE_TIMEOUT_MS: u64 = 30_000;

/// Validates a workflow graph and builds its execution plan.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Validates `graph` and builds its [`ExecutionPlan`].
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] encountered. Validation order is
    /// structural checks, then node-kind checks, then cycle detection.
    pub fn build(graph: &WorkflowGraph) -> Result<ExecutionPlan, GraphError> {
        Self::validate_structure(graph)?;
        Self::validate_node_kinds(graph)?;
        Self::validate_expressions(graph)?;

        let (pg, index_of) = Self::to_petgraph(graph);
        Self::detect_cycle(&pg, &index_of, graph)?;

        let order = Self::topological_order(graph);
        let levels = Self::compute_levels(graph, &order);
        let nodes = graph
            .nodes
            .iter()
            .map(|n| PlannedNode {
                id: n.id.clone(),
                in_degree: graph.edges.iter().filter(|e| e.to_node_id == n.id).count(),
                out_degree: graph.edges.iter().filter(|e| e.from_node_id == n.id).count(),
                level: levels[&n.id],
            })
            .collect::<Vec<_>>();

        let parallel_groups = Self::group_by_level(&nodes);
        let parallelization_level = parallel_groups.iter().map(Vec::len).max().unwrap_or(0);

        Ok(ExecutionPlan {
            total_tasks: nodes.len(),
            nodes,
            order,
            parallel_groups,
            parallelization_level,
        })
    }

    /// Estimates total wall-clock duration by summing, per parallel group,
    /// the slowest node's timeout. This is purely informational and never
    /// used for correctness.
    #[must_use]
    pub fn estimate_duration_ms(graph: &WorkflowGraph, plan: &ExecutionPlan) -> u64 {
        plan.parallel_groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter_map(|id| graph.find_node(id))
                    .map(|n| n.max_execution_time_ms.unwrap_or(DEFAULT_NODE_TIMEOUT_MS))
                    .max()
                    .unwrap_or(DEFAULT_NODE_TIMEOUT_MS)
            })
            .sum()
    }

    fn validate_structure(graph: &WorkflowGraph) -> Result<(), GraphError> {
        if graph.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let mut seen = HashSet::new();
        for node in &graph.nodes {
            if !seen.insert(&node.id) {
                return Err(GraphError::DuplicateNodeId { node_id: node.id.clone() });
            }
        }

        let known: HashSet<&NodeId> = graph.nodes.iter().map(|n| &n.id).collect();
        for edge in &graph.edges {
            if edge.from_node_id == edge.to_node_id {
                return Err(GraphError::SelfLoop { node_id: edge.from_node_id.clone() });
            }
            if !known.contains(&edge.from_node_id) {
                return Err(GraphError::DanglingEdge { node_id: edge.from_node_id.clone() });
            }
            if !known.contains(&edge.to_node_id) {
                return Err(GraphError::DanglingEdge { node_id: edge.to_node_id.clone() });
            }
        }

        let start_count = graph.nodes.iter().filter(|n| matches!(n.kind, crate::node::NodeKind::Start)).count();
        if start_count == 0 {
            return Err(GraphError::MissingStart);
        }
        if start_count > 1 {
            return Err(GraphError::DuplicateStart);
        }

        let end_count = graph.nodes.iter().filter(|n| matches!(n.kind, crate::node::NodeKind::End)).count();
        if end_count == 0 {
            return Err(GraphError::MissingEnd);
        }

        for node in &graph.nodes {
            if matches!(node.kind, crate::node::NodeKind::Start | crate::node::NodeKind::End) {
                continue;
            }
            let has_incoming = graph.edges.iter().any(|e| e.to_node_id == node.id);
            let has_outgoing = graph.edges.iter().any(|e| e.from_node_id == node.id);
            if !has_incoming || !has_outgoing {
                return Err(GraphError::OrphanNode { node_id: node.id.clone() });
            }
        }

        Ok(())
    }

    fn validate_node_kinds(graph: &WorkflowGraph) -> Result<(), GraphError> {
        for node in &graph.nodes {
            if matches!(node.kind, crate::node::NodeKind::Unknown) {
                return Err(GraphError::UnsupportedNodeType { node_id: node.id.clone() });
            }
        }
        Ok(())
    }

    fn validate_expressions(graph: &WorkflowGraph) -> Result<(), GraphError> {
        for edge in &graph.edges {
            if let Some(EdgeCondition::Expression { expression }) = &edge.condition {
                if !crate::expr::is_well_formed(expression) {
                    return Err(GraphError::InvalidExpression {
                        node_id: edge.from_node_id.clone(),
                        expression: expression.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn to_petgraph(graph: &WorkflowGraph) -> (DiGraph<NodeId, ()>, HashMap<NodeId, NodeIndex>) {
        let mut pg = DiGraph::new();
        let mut index_of = HashMap::new();
        for node in &graph.nodes {
            let idx = pg.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
        }
        for edge in &graph.edges {
            pg.add_edge(index_of[&edge.from_node_id], index_of[&edge.to_node_id], ());
        }
        (pg, index_of)
    }

    fn detect_cycle(
        pg: &DiGraph<NodeId, ()>,
        index_of: &HashMap<NodeId, NodeIndex>,
        graph: &WorkflowGraph,
    ) -> Result<(), GraphError> {
        if !petgraph::algo::is_cyclic_directed(pg) {
            return Ok(());
        }

        // Re-walk with an explicit recursion stack so we can report the path.
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&NodeId, Mark> = HashMap::new();
        let mut stack: Vec<NodeId> = Vec::new();

        fn visit<'a>(
            node: &'a NodeId,
            graph: &'a WorkflowGraph,
            marks: &mut HashMap<&'a NodeId, Mark>,
            stack: &mut Vec<NodeId>,
        ) -> Option<Vec<NodeId>> {
            stack.push(node.clone());
            marks.insert(node, Mark::Visiting);
            for edge in graph.outgoing_edges(node) {
                match marks.get(&edge.to_node_id) {
                    Some(Mark::Visiting) => {
                        let start = stack.iter().position(|n| n == &edge.to_node_id).unwrap_or(0);
                        let mut path = stack[start..].to_vec();
                        path.push(edge.to_node_id.clone());
                        return Some(path);
                    }
                    Some(Mark::Done) => continue,
                    None => {
                        if let Some(path) = visit(&edge.to_node_id, graph, marks, stack) {
                            return Some(path);
                        }
                    }
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for node in &graph.nodes {
            if marks.contains_key(&node.id) {
                continue;
            }
            if let Some(path) = visit(&node.id, graph, &mut marks, &mut stack) {
                return Err(GraphError::CycleDetected { path });
            }
        }

        // Unreachable given is_cyclic_directed returned true, but keep the
        // compiler honest and avoid panicking on an unexpected mismatch.
        let _ = index_of;
        Err(GraphError::CycleDetected { path: Vec::new() })
    }

    /// Kahn's algorithm, breaking ties on the lexicographically smallest
    /// node id so replays always produce the same order.
    fn topological_order(graph: &WorkflowGraph) -> Vec<NodeId> {
        let mut in_degree: HashMap<&NodeId, usize> = graph.nodes.iter().map(|n| (&n.id, 0)).collect();
        for edge in &graph.edges {
            *in_degree.get_mut(&edge.to_node_id).unwrap() += 1;
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| (*id).clone())
            .collect();

        let mut order = Vec::with_capacity(graph.nodes.len());
        let mut remaining = in_degree;

        while let Some(next) = ready.iter().next().cloned() {
            ready.remove(&next);
            order.push(next.clone());
            for edge in graph.outgoing_edges(&next) {
                if let Some(deg) = remaining.get_mut(&edge.to_node_id) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(edge.to_node_id.clone());
                    }
                }
            }
        }

        order
    }

    fn compute_levels(graph: &WorkflowGraph, order: &[NodeId]) -> HashMap<NodeId, usize> {
        let mut levels: HashMap<NodeId, usize> = HashMap::new();
        for id in order {
            let incoming_max = graph
                .edges
                .iter()
                .filter(|e| &e.to_node_id == id)
                .filter_map(|e| levels.get(&e.from_node_id))
                .max()
                .copied();
            levels.insert(id.clone(), incoming_max.map_or(0, |m| m + 1));
        }
        levels
    }

    fn group_by_level(nodes: &[PlannedNode]) -> Vec<Vec<NodeId>> {
        let max_level = nodes.iter().map(|n| n.level).max().unwrap_or(0);
        let mut groups = vec![Vec::new(); max_level + 1];
        for node in nodes {
            groups[node.level].push(node.id.clone());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::GraphConfig;
    use crate::edge::Edge;
    use crate::node::{Node, NodeKind};
    use meridian_core::{TenantId, WorkflowId};

    fn graph_with(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowGraph {
        WorkflowGraph {
            workflow_id: WorkflowId::new(),
            version: "1.0.0".to_string(),
            tenant_id: TenantId::new("acme").unwrap(),
            nodes,
            edges,
            config: GraphConfig::default(),
        }
    }

    fn linear() -> WorkflowGraph {
        graph_with(
            vec![
                Node::new("START", NodeKind::Start),
                Node::new("A", NodeKind::Delay { delay_ms: 10 }),
                Node::new("END", NodeKind::End),
            ],
            vec![Edge::new("START", "A"), Edge::new("A", "END")],
        )
    }

    #[test]
    fn valid_linear_graph_builds_plan() {
        let plan = GraphBuilder::build(&linear()).expect("should build");
        assert_eq!(plan.total_tasks, 3);
        assert_eq!(plan.order, vec![NodeId::new("START"), NodeId::new("A"), NodeId::new("END")]);
    }

    #[test]
    fn empty_graph_rejected() {
        let graph = graph_with(vec![], vec![]);
        assert_eq!(GraphBuilder::build(&graph).unwrap_err(), GraphError::EmptyGraph);
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let graph = graph_with(
            vec![Node::new("A", NodeKind::Start), Node::new("A", NodeKind::End)],
            vec![],
        );
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::DuplicateNodeId { .. })));
    }

    #[test]
    fn missing_start_rejected() {
        let graph = graph_with(vec![Node::new("END", NodeKind::End)], vec![]);
        assert_eq!(GraphBuilder::build(&graph).unwrap_err(), GraphError::MissingStart);
    }

    #[test]
    fn duplicate_start_rejected() {
        let graph = graph_with(
            vec![
                Node::new("S1", NodeKind::Start),
                Node::new("S2", NodeKind::Start),
                Node::new("END", NodeKind::End),
            ],
            vec![],
        );
        assert_eq!(GraphBuilder::build(&graph).unwrap_err(), GraphError::DuplicateStart);
    }

    #[test]
    fn missing_end_rejected() {
        let graph = graph_with(vec![Node::new("START", NodeKind::Start)], vec![]);
        assert_eq!(GraphBuilder::build(&graph).unwrap_err(), GraphError::MissingEnd);
    }

    #[test]
    fn dangling_edge_rejected() {
        let mut graph = linear();
        graph.edges.push(Edge::new("A", "GHOST"));
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::DanglingEdge { .. })));
    }

    #[test]
    fn self_loop_rejected() {
        let mut graph = linear();
        graph.edges.push(Edge::new("A", "A"));
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::SelfLoop { .. })));
    }

    #[test]
    fn orphan_non_terminal_node_rejected() {
        let mut graph = linear();
        graph.nodes.push(Node::new("ORPHAN", NodeKind::Delay { delay_ms: 1 }));
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::OrphanNode { .. })));
    }

    #[test]
    fn unknown_node_type_rejected() {
        let mut graph = linear();
        let unknown_json = r#"{"id":"X","type":"TOTALLY_MADE_UP"}"#;
        #[derive(serde::Deserialize)]
        struct Raw {
            id: String,
            #[serde(rename = "type")]
            _kind: String,
        }
        let _raw: Raw = serde_json::from_str(unknown_json).unwrap();
        graph.nodes.push(Node::new("X", NodeKind::Unknown));
        graph.edges.push(Edge::new("A", "X"));
        graph.edges.push(Edge::new("X", "END"));
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::UnsupportedNodeType { .. })));
    }

    #[test]
    fn cycle_rejected_with_path() {
        let graph = graph_with(
            vec![
                Node::new("START", NodeKind::Start),
                Node::new("A", NodeKind::Delay { delay_ms: 1 }),
                Node::new("B", NodeKind::Delay { delay_ms: 1 }),
                Node::new("END", NodeKind::End),
            ],
            vec![
                Edge::new("START", "A"),
                Edge::new("A", "B"),
                Edge::new("B", "A"),
                Edge::new("B", "END"),
            ],
        );
        match GraphBuilder::build(&graph) {
            Err(GraphError::CycleDetected { path }) => {
                assert!(path.contains(&NodeId::new("A")));
                assert!(path.contains(&NodeId::new("B")));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn parallel_groups_share_level() {
        let graph = graph_with(
            vec![
                Node::new("START", NodeKind::Start),
                Node::new("A", NodeKind::Delay { delay_ms: 1 }),
                Node::new("B", NodeKind::Delay { delay_ms: 1 }),
                Node::new("END", NodeKind::End),
            ],
            vec![
                Edge::new("START", "A"),
                Edge::new("START", "B"),
                Edge::new("A", "END"),
                Edge::new("B", "END"),
            ],
        );
        let plan = GraphBuilder::build(&graph).expect("should build");
        let group_with_ab = plan
            .parallel_groups
            .iter()
            .find(|g| g.contains(&NodeId::new("A")))
            .unwrap();
        assert!(group_with_ab.contains(&NodeId::new("B")));
    }

    #[test]
    fn invalid_expression_rejected() {
        let mut graph = linear();
        graph.edges.push(Edge::with_condition(
            "A",
            "END",
            crate::edge::EdgeCondition::Expression {
                expression: "not an expression".to_string(),
            },
        ));
        assert!(matches!(GraphBuilder::build(&graph), Err(GraphError::InvalidExpression { .. })));
    }
}
