use std::collections::{HashSet, VecDeque};

use crate::error::EngineError;

use super::builder::Graph;

/// 拓扑排序
///
/// 图中存在环时返回 [`EngineError::CycleDetected`]，不返回部分排序结果。
pub fn topological_sort(graph: &Graph) -> Result<Vec<String>, EngineError> {
    let sorted =
        petgraph::algo::toposort(&graph.graph, None).map_err(|_| EngineError::CycleDetected)?;

    Ok(sorted
        .into_iter()
        .filter_map(|idx| graph.graph.node_weight(idx).map(|n| n.id.clone()))
        .collect())
}

/// 计算节点的全部祖先（传递依赖），不包含节点自身
pub fn ancestors(graph: &Graph, node_id: &str) -> Result<HashSet<String>, EngineError> {
    if !graph.contains(node_id) {
        return Err(EngineError::NodeNotFound(node_id.to_string()));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(node_id.to_string());

    while let Some(current) = queue.pop_front() {
        for pred in graph.predecessors(&current) {
            if seen.insert(pred.clone()) {
                queue.push_back(pred);
            }
        }
    }

    seen.remove(node_id);
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::build_graph;
    use crate::graph::types::{WorkflowEdge, WorkflowNode};
    use serde_json::json;

    fn diamond() -> Graph {
        // a -> b -> d, a -> c -> d
        let nodes = vec![
            WorkflowNode::new("a", "source", json!({})),
            WorkflowNode::new("b", "transform", json!({})),
            WorkflowNode::new("c", "transform", json!({})),
            WorkflowNode::new("d", "sink", json!({})),
        ];
        let edges = vec![
            WorkflowEdge::new("a", "b"),
            WorkflowEdge::new("a", "c"),
            WorkflowEdge::new("b", "d"),
            WorkflowEdge::new("c", "d"),
        ];
        build_graph(&nodes, &edges).unwrap()
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let graph = diamond();
        let order = topological_sort(&graph).unwrap();
        assert_eq!(order.len(), 4);

        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let nodes = vec![
            WorkflowNode::new("a", "transform", json!({})),
            WorkflowNode::new("b", "transform", json!({})),
        ];
        let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "a")];
        let graph = build_graph(&nodes, &edges).unwrap();
        assert!(matches!(
            topological_sort(&graph),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let nodes = vec![WorkflowNode::new("a", "transform", json!({}))];
        let edges = vec![WorkflowEdge::new("a", "a")];
        let graph = build_graph(&nodes, &edges).unwrap();
        assert!(matches!(
            topological_sort(&graph),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn test_ancestors_transitive() {
        let graph = diamond();
        let anc = ancestors(&graph, "d").unwrap();
        assert_eq!(anc.len(), 3);
        assert!(anc.contains("a"));
        assert!(anc.contains("b"));
        assert!(anc.contains("c"));

        let anc_b = ancestors(&graph, "b").unwrap();
        assert_eq!(anc_b.len(), 1);
        assert!(anc_b.contains("a"));

        assert!(ancestors(&graph, "a").unwrap().is_empty());
    }

    #[test]
    fn test_ancestors_unknown_node() {
        let graph = diamond();
        assert!(matches!(
            ancestors(&graph, "ghost"),
            Err(EngineError::NodeNotFound(_))
        ));
    }
}
