use thiserror::Error;

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("No executor registered for node type: {0}")]
    UnknownCapability(String),
    #[error("Input error: {0}")]
    Input(String),
    #[error("Cannot convert '{from}' to '{to}': {message}")]
    Conversion {
        from: String,
        to: String,
        message: String,
    },
    #[error("Type error: {0}")]
    Type(String),
    #[error("Timeout: node invocation exceeded time limit")]
    Timeout,
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}
