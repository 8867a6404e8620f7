//! Engine-level error types.

use crate::graph::validator::ValidationReport;
use thiserror::Error;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Graph build error: {0}")]
    GraphBuild(String),
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Validation failed with {} issue(s)", .0.diagnostics.len())]
    ValidationFailed(Box<ValidationReport>),
    #[error("Resume error: {0}")]
    Resume(String),
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("Node execution error: node={node_id}, type={node_type}: {error}")]
    NodeExecution {
        node_id: String,
        node_type: String,
        error: String,
        detail: Option<serde_json::Value>,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Validation reports travel boxed; convenience accessor for callers
    /// that want the diagnostics back.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            EngineError::ValidationFailed(report) => Some(report),
            _ => None,
        }
    }
}
