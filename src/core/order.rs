//! Execution order resolution.
//!
//! Selects the node subset for a run from the full topological order,
//! according to the requested execution mode.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::graph::{ancestors, Graph};

/// How the node subset for a run is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every node in topological order.
    Full,
    /// The selected nodes plus their transitive dependencies.
    Partial,
    /// Continue from a node, splicing in ancestors a prior run missed.
    Resume,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Full
    }
}

/// Resolve the ordered node subset to execute.
///
/// The returned order is always a subsequence of `full_order`, so it stays
/// consistent with every edge. Nodes outside the subset are the caller's to
/// mark `Skipped`; they never block anything.
pub fn resolve_execution_order(
    graph: &Graph,
    full_order: &[String],
    mode: ExecutionMode,
    selected_nodes: &[String],
    resume_from: Option<&str>,
    previous_completed: Option<&HashSet<String>>,
) -> EngineResult<Vec<String>> {
    match mode {
        ExecutionMode::Full => Ok(full_order.to_vec()),

        ExecutionMode::Partial => {
            let mut include: HashSet<String> = HashSet::new();
            for node_id in selected_nodes {
                if !graph.contains(node_id) {
                    return Err(EngineError::NodeNotFound(node_id.clone()));
                }
                include.insert(node_id.clone());
                include.extend(ancestors(graph, node_id)?);
            }
            Ok(filter_order(full_order, &include))
        }

        ExecutionMode::Resume => {
            let resume_from = resume_from
                .ok_or_else(|| EngineError::Resume("resume_from_node is required".to_string()))?;
            let position = full_order
                .iter()
                .position(|id| id == resume_from)
                .ok_or_else(|| {
                    EngineError::Resume(format!(
                        "resume node not in execution order: {}",
                        resume_from
                    ))
                })?;

            let mut include: HashSet<String> = full_order[position..].iter().cloned().collect();

            // Ancestors the previous run never completed get spliced back
            // in; re-filtering through the full order restores topological
            // position.
            if let Some(completed) = previous_completed {
                for ancestor in ancestors(graph, resume_from)? {
                    if !completed.contains(&ancestor) {
                        include.insert(ancestor);
                    }
                }
            }

            Ok(filter_order(full_order, &include))
        }
    }
}

fn filter_order(full_order: &[String], include: &HashSet<String>) -> Vec<String> {
    full_order
        .iter()
        .filter(|id| include.contains(*id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, topological_sort, WorkflowEdge, WorkflowNode};
    use serde_json::json;

    fn linear() -> (Graph, Vec<String>) {
        let nodes = vec![
            WorkflowNode::new("a", "source", json!({})),
            WorkflowNode::new("b", "transform", json!({})),
            WorkflowNode::new("c", "sink", json!({})),
        ];
        let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "c")];
        let graph = build_graph(&nodes, &edges).unwrap();
        let order = topological_sort(&graph).unwrap();
        (graph, order)
    }

    fn branched() -> (Graph, Vec<String>) {
        // a -> b -> d, a -> c (c independent of b/d)
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
        ];
        let graph = build_graph(&nodes, &edges).unwrap();
        let order = topological_sort(&graph).unwrap();
        (graph, order)
    }

    #[test]
    fn test_full_returns_whole_order() {
        let (graph, order) = linear();
        let resolved =
            resolve_execution_order(&graph, &order, ExecutionMode::Full, &[], None, None).unwrap();
        assert_eq!(resolved, order);
    }

    #[test]
    fn test_partial_pulls_in_dependencies() {
        let (graph, order) = linear();
        let resolved = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Partial,
            &["c".to_string()],
            None,
            None,
        )
        .unwrap();
        assert_eq!(resolved, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_partial_excludes_unrelated_branches() {
        let (graph, order) = branched();
        let resolved = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Partial,
            &["d".to_string()],
            None,
            None,
        )
        .unwrap();
        assert_eq!(resolved, vec!["a", "b", "d"]);
        assert!(!resolved.contains(&"c".to_string()));
    }

    #[test]
    fn test_partial_unknown_selection_fails() {
        let (graph, order) = linear();
        let err = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Partial,
            &["ghost".to_string()],
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NodeNotFound(_)));
    }

    #[test]
    fn test_partial_empty_selection_is_empty() {
        let (graph, order) = linear();
        let resolved =
            resolve_execution_order(&graph, &order, ExecutionMode::Partial, &[], None, None)
                .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_resume_slices_from_node() {
        let (graph, order) = linear();
        let resolved = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Resume,
            &[],
            Some("b"),
            None,
        )
        .unwrap();
        assert_eq!(resolved, vec!["b", "c"]);
    }

    #[test]
    fn test_resume_missing_node_fails() {
        let (graph, order) = linear();
        let err = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Resume,
            &[],
            Some("ghost"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Resume(_)));
    }

    #[test]
    fn test_resume_without_resume_from_fails() {
        let (graph, order) = linear();
        let err =
            resolve_execution_order(&graph, &order, ExecutionMode::Resume, &[], None, None)
                .unwrap_err();
        assert!(matches!(err, EngineError::Resume(_)));
    }

    #[test]
    fn test_resume_splices_missing_ancestors() {
        let (graph, order) = linear();

        // Previous run completed only "a"; resuming at "c" must splice "b"
        // back in, re-sorted to topological position.
        let completed: HashSet<String> = ["a".to_string()].into_iter().collect();
        let resolved = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Resume,
            &[],
            Some("c"),
            Some(&completed),
        )
        .unwrap();
        assert_eq!(resolved, vec!["b", "c"]);
    }

    #[test]
    fn test_resume_with_all_ancestors_completed() {
        let (graph, order) = linear();
        let completed: HashSet<String> =
            ["a".to_string(), "b".to_string()].into_iter().collect();
        let resolved = resolve_execution_order(
            &graph,
            &order,
            ExecutionMode::Resume,
            &[],
            Some("c"),
            Some(&completed),
        )
        .unwrap();
        assert_eq!(resolved, vec!["c"]);
    }
}
