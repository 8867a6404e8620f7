use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::EngineError;

use super::types::*;

/// 工作流图 - 每次执行前从提交的节点和边构建，不跨执行共享
///
/// 节点和边存放在 petgraph 的稳定图中，按字符串 ID 索引；节点之间不持有
/// 任何反向引用。
#[derive(Debug)]
pub struct Graph {
    /// 图结构
    pub(crate) graph: StableDiGraph<WorkflowNode, WorkflowEdge>,

    /// 节点 ID 到 NodeIndex 的映射
    pub(crate) node_index_map: NodeIndexMap,
}

impl Graph {
    /// 根据节点 ID 获取图节点
    pub fn get_node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.node_index_map
            .get(node_id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// 节点是否存在
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// 节点数量
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// 获取节点的所有前驱节点 ID（未知节点返回空）
    pub fn predecessors(&self, node_id: &str) -> Vec<String> {
        let Some(idx) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*idx, petgraph::Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n).map(|node| node.id.clone()))
            .collect()
    }

    /// 获取节点的所有后继节点 ID（未知节点返回空）
    pub fn successors(&self, node_id: &str) -> Vec<String> {
        let Some(idx) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*idx, petgraph::Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).map(|node| node.id.clone()))
            .collect()
    }

    /// 获取目标节点的所有入边
    pub fn incoming_edges(&self, node_id: &str) -> Vec<WorkflowEdge> {
        let Some(idx) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*idx, petgraph::Direction::Incoming)
            .map(|edge| edge.weight().clone())
            .collect()
    }

}

/// 从提交的节点和边构建工作流图
///
/// 任何引用未知节点 ID 的边都会导致构建失败。
pub fn build_graph(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Result<Graph, EngineError> {
    let mut graph = StableDiGraph::<WorkflowNode, WorkflowEdge>::new();
    let mut node_index_map: HashMap<String, NodeIndex> = HashMap::new();

    // 1. 添加所有节点
    for node in nodes {
        if node_index_map.contains_key(&node.id) {
            return Err(EngineError::GraphBuild(format!(
                "Duplicate node id: {}",
                node.id
            )));
        }
        let idx = graph.add_node(node.clone());
        node_index_map.insert(node.id.clone(), idx);
    }

    // 2. 添加所有边
    for edge in edges {
        let source_idx = node_index_map.get(&edge.source_id).ok_or_else(|| {
            EngineError::GraphBuild(format!("Source node not found: {}", edge.source_id))
        })?;

        let target_idx = node_index_map.get(&edge.target_id).ok_or_else(|| {
            EngineError::GraphBuild(format!("Target node not found: {}", edge.target_id))
        })?;

        graph.add_edge(*source_idx, *target_idx, edge.clone());
    }

    Ok(Graph {
        graph,
        node_index_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_nodes() -> Vec<WorkflowNode> {
        vec![
            WorkflowNode::new("a", "source", json!({})),
            WorkflowNode::new("b", "transform", json!({})),
            WorkflowNode::new("c", "sink", json!({})),
        ]
    }

    #[test]
    fn test_build_simple_graph() {
        let nodes = linear_nodes();
        let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "c")];
        let graph = build_graph(&nodes, &edges).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.get_node("b").unwrap().node_type, "transform");
        assert_eq!(graph.successors("a"), vec!["b"]);
        assert_eq!(graph.predecessors("c"), vec!["b"]);
    }

    #[test]
    fn test_unknown_source_fails() {
        let nodes = linear_nodes();
        let edges = vec![WorkflowEdge::new("ghost", "b")];
        let err = build_graph(&nodes, &edges).unwrap_err();
        assert!(matches!(err, EngineError::GraphBuild(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_target_fails() {
        let nodes = linear_nodes();
        let edges = vec![WorkflowEdge::new("a", "ghost")];
        let err = build_graph(&nodes, &edges).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_node_id_fails() {
        let nodes = vec![
            WorkflowNode::new("a", "source", json!({})),
            WorkflowNode::new("a", "sink", json!({})),
        ];
        let err = build_graph(&nodes, &[]).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_incoming_edges_carry_ports() {
        let nodes = linear_nodes();
        let edges = vec![
            WorkflowEdge::with_ports("a", "out", "b", "in"),
            WorkflowEdge::new("b", "c"),
        ];
        let graph = build_graph(&nodes, &edges).unwrap();
        let incoming = graph.incoming_edges("b");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_port.as_deref(), Some("out"));
        assert_eq!(incoming[0].target_port.as_deref(), Some("in"));
    }
}
