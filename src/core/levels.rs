//! Level grouping.
//!
//! Partitions a resolved execution subset into dependency levels: a node's
//! level is the length of its longest path from any root of the induced
//! subgraph. Nodes sharing a level have no edge between them and may run
//! concurrently; levels execute strictly in sequence.

use std::collections::{HashMap, HashSet};

use crate::graph::Graph;

/// Group an ordered node subset into ascending dependency levels.
///
/// `subset` must be topologically ordered (it always is when produced by
/// [`resolve_execution_order`](crate::core::resolve_execution_order)); the
/// in-level order preserves the subset order for reproducible logs.
pub fn group_into_levels(graph: &Graph, subset: &[String]) -> Vec<Vec<String>> {
    let subset_set: HashSet<&str> = subset.iter().map(String::as_str).collect();
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for node_id in subset {
        // 只看诱导子图内的前驱；子图根节点层级为 0
        let level = graph
            .predecessors(node_id)
            .iter()
            .filter(|pred| subset_set.contains(pred.as_str()))
            .filter_map(|pred| level_of.get(pred.as_str()))
            .max()
            .map(|max_pred_level| max_pred_level + 1)
            .unwrap_or(0);

        level_of.insert(node_id.as_str(), level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(node_id.clone());
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, topological_sort, WorkflowEdge, WorkflowNode};
    use serde_json::json;

    fn diamond() -> (Graph, Vec<String>) {
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
        let graph = build_graph(&nodes, &edges).unwrap();
        let order = topological_sort(&graph).unwrap();
        (graph, order)
    }

    #[test]
    fn test_diamond_levels() {
        let (graph, order) = diamond();
        let levels = group_into_levels(&graph, &order);

        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a"]);
        let mut middle = levels[1].clone();
        middle.sort();
        assert_eq!(middle, vec!["b", "c"]);
        assert_eq!(levels[2], vec!["d"]);
    }

    #[test]
    fn test_levels_are_a_partition() {
        let (graph, order) = diamond();
        let levels = group_into_levels(&graph, &order);

        let mut seen: Vec<&String> = levels.iter().flatten().collect();
        seen.sort();
        let mut expected: Vec<&String> = order.iter().collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_longest_path_wins_over_bfs_depth() {
        // a -> b -> d, a -> d: d 的层级由最长路径决定（2 而不是 1）
        let nodes = vec![
            WorkflowNode::new("a", "source", json!({})),
            WorkflowNode::new("b", "transform", json!({})),
            WorkflowNode::new("d", "sink", json!({})),
        ];
        let edges = vec![
            WorkflowEdge::new("a", "b"),
            WorkflowEdge::new("a", "d"),
            WorkflowEdge::new("b", "d"),
        ];
        let graph = build_graph(&nodes, &edges).unwrap();
        let order = topological_sort(&graph).unwrap();
        let levels = group_into_levels(&graph, &order);

        assert_eq!(levels[0], vec!["a"]);
        assert_eq!(levels[1], vec!["b"]);
        assert_eq!(levels[2], vec!["d"]);
    }

    #[test]
    fn test_excluded_predecessors_do_not_block() {
        // 子集不含 a 时，b 成为子图根节点
        let (graph, _) = diamond();
        let subset = vec!["b".to_string(), "d".to_string()];
        let levels = group_into_levels(&graph, &subset);

        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], vec!["b"]);
        assert_eq!(levels[1], vec!["d"]);
    }

    #[test]
    fn test_disconnected_nodes_share_level_zero() {
        let nodes = vec![
            WorkflowNode::new("x", "source", json!({})),
            WorkflowNode::new("y", "source", json!({})),
        ];
        let graph = build_graph(&nodes, &[]).unwrap();
        let order = topological_sort(&graph).unwrap();
        let levels = group_into_levels(&graph, &order);

        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].len(), 2);
    }

    #[test]
    fn test_level_invariant_for_every_edge() {
        let (graph, order) = diamond();
        let levels = group_into_levels(&graph, &order);

        let level_of = |id: &str| {
            levels
                .iter()
                .position(|level| level.iter().any(|n| n == id))
                .unwrap()
        };
        for (source, target) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            assert!(level_of(source) < level_of(target));
        }
    }
}
