//! Connection validation.
//!
//! Every edge in a submission is checked against the capability metadata of
//! its endpoints and the type-compatibility engine. Findings are collected
//! into a [`ValidationReport`] rather than thrown one at a time, so the
//! caller sees every issue at once; a report with errors gates execution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::nodes::{NodeExecutorRegistry, PortDefinition};
use crate::types::TypeRegistry;

use super::types::{WorkflowEdge, WorkflowNode};

/// Severity level of a validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    pub node_id: Option<String>,
    pub connection: Option<String>,
}

/// Aggregated result of connection validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Return only the error-level diagnostics.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    /// Return only the warning-level diagnostics.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }
}

/// Validate every connection in a submission.
///
/// For each edge the source and target capability metadata is resolved; a
/// missing capability or missing port declaration produces a node-level
/// issue, an incompatible port-type pair produces a connection-level issue
/// naming both types. Ports left unspecified on the edge default to the
/// first declared port on the corresponding side.
pub fn validate_connections(
    nodes: &[WorkflowNode],
    edges: &[WorkflowEdge],
    registry: &NodeExecutorRegistry,
    types: &TypeRegistry,
) -> ValidationReport {
    let node_by_id: HashMap<&str, &WorkflowNode> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut diagnostics = Vec::new();

    for edge in edges {
        let source_type = resolve_port_type(
            &node_by_id,
            registry,
            &edge.source_id,
            edge.source_port.as_deref(),
            PortSide::Output,
            &mut diagnostics,
        );
        let target_type = resolve_port_type(
            &node_by_id,
            registry,
            &edge.target_id,
            edge.target_port.as_deref(),
            PortSide::Input,
            &mut diagnostics,
        );

        let (Some(source_type), Some(target_type)) = (source_type, target_type) else {
            continue;
        };

        if !types.is_compatible(&source_type, &target_type).compatible {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                code: "E205".to_string(),
                message: format!(
                    "Incompatible connection: {} output '{}' cannot feed {} input '{}'",
                    edge.source_id, source_type, edge.target_id, target_type
                ),
                node_id: None,
                connection: Some(edge.label()),
            });
        }
    }

    ValidationReport {
        is_valid: !diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error),
        diagnostics,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum PortSide {
    Input,
    Output,
}

impl PortSide {
    fn name(self) -> &'static str {
        match self {
            PortSide::Input => "input",
            PortSide::Output => "output",
        }
    }
}

fn resolve_port_type(
    node_by_id: &HashMap<&str, &WorkflowNode>,
    registry: &NodeExecutorRegistry,
    node_id: &str,
    port: Option<&str>,
    side: PortSide,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    let Some(node) = node_by_id.get(node_id) else {
        diagnostics.push(node_error(
            "E201",
            format!("Edge references unknown node: {}", node_id),
            node_id,
        ));
        return None;
    };

    let Some(metadata) = registry.metadata(&node.node_type) else {
        diagnostics.push(node_error(
            "E202",
            format!(
                "No capability registered for node type '{}'",
                node.node_type
            ),
            node_id,
        ));
        return None;
    };

    let ports: &[PortDefinition] = match side {
        PortSide::Input => &metadata.inputs,
        PortSide::Output => &metadata.outputs,
    };

    if ports.is_empty() {
        diagnostics.push(node_error(
            "E203",
            format!(
                "Node type '{}' declares no {} ports",
                node.node_type,
                side.name()
            ),
            node_id,
        ));
        return None;
    }

    // 端口缺省时取第一个声明的端口
    let resolved = match port {
        Some(port_id) => ports.iter().find(|p| p.id == port_id),
        None => ports.first(),
    };

    match resolved {
        Some(port_def) => Some(port_def.port_type.clone()),
        None => {
            diagnostics.push(node_error(
                "E204",
                format!(
                    "Node type '{}' has no {} port named '{}'",
                    node.node_type,
                    side.name(),
                    port.unwrap_or_default()
                ),
                node_id,
            ));
            None
        }
    }
}

fn node_error(code: &str, message: String, node_id: &str) -> Diagnostic {
    Diagnostic {
        level: DiagnosticLevel::Error,
        code: code.to_string(),
        message,
        node_id: Some(node_id.to_string()),
        connection: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NodeExecutor, NodeMetadata};
    use crate::error::NodeResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    struct FixedPortExecutor {
        metadata: NodeMetadata,
    }

    #[async_trait]
    impl NodeExecutor for FixedPortExecutor {
        fn metadata(&self) -> NodeMetadata {
            self.metadata.clone()
        }

        async fn invoke(
            &self,
            _inputs: &HashMap<String, Value>,
            _config: &Value,
        ) -> NodeResult<HashMap<String, Value>> {
            Ok(HashMap::new())
        }
    }

    fn registry() -> NodeExecutorRegistry {
        let mut registry = NodeExecutorRegistry::new();
        registry.register(
            "emitter",
            std::sync::Arc::new(FixedPortExecutor {
                metadata: NodeMetadata::new("emitter")
                    .with_output(PortDefinition::new("out", "number")),
            }),
        );
        registry.register(
            "consumer",
            std::sync::Arc::new(FixedPortExecutor {
                metadata: NodeMetadata::new("consumer")
                    .with_input(PortDefinition::new("in", "string")),
            }),
        );
        registry.register(
            "strict",
            std::sync::Arc::new(FixedPortExecutor {
                metadata: NodeMetadata::new("strict")
                    .with_input(PortDefinition::new("in", "custom-record")),
            }),
        );
        registry
    }

    fn nodes() -> Vec<WorkflowNode> {
        vec![
            WorkflowNode::new("a", "emitter", json!({})),
            WorkflowNode::new("b", "consumer", json!({})),
            WorkflowNode::new("c", "strict", json!({})),
        ]
    }

    #[test]
    fn test_compatible_connection_passes() {
        // number -> string is implicitly convertible with builtin rules
        let report = validate_connections(
            &nodes(),
            &[WorkflowEdge::new("a", "b")],
            &registry(),
            &TypeRegistry::with_builtin_types(),
        );
        assert!(report.is_valid, "{:?}", report.diagnostics);
    }

    #[test]
    fn test_incompatible_connection_reports_both_types() {
        let report = validate_connections(
            &nodes(),
            &[WorkflowEdge::new("a", "c")],
            &registry(),
            &TypeRegistry::with_builtin_types(),
        );
        assert!(!report.is_valid);
        let errors = report.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "E205");
        assert!(errors[0].message.contains("number"));
        assert!(errors[0].message.contains("custom-record"));
        assert_eq!(errors[0].connection.as_deref(), Some("a -> c"));
    }

    #[test]
    fn test_unknown_capability_is_node_level() {
        let nodes = vec![
            WorkflowNode::new("a", "emitter", json!({})),
            WorkflowNode::new("x", "does-not-exist", json!({})),
        ];
        let report = validate_connections(
            &nodes,
            &[WorkflowEdge::new("a", "x")],
            &registry(),
            &TypeRegistry::with_builtin_types(),
        );
        let errors = report.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "E202");
        assert_eq!(errors[0].node_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_missing_named_port() {
        let report = validate_connections(
            &nodes(),
            &[WorkflowEdge::with_ports("a", "nope", "b", "in")],
            &registry(),
            &TypeRegistry::with_builtin_types(),
        );
        let errors = report.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "E204");
    }

    #[test]
    fn test_unknown_node_in_edge() {
        let report = validate_connections(
            &nodes(),
            &[WorkflowEdge::new("ghost", "b")],
            &registry(),
            &TypeRegistry::with_builtin_types(),
        );
        let errors = report.errors();
        assert_eq!(errors[0].code, "E201");
    }
}
