//! Error types for the execution engine.
//!
//! - [`NodeError`] — Errors raised during individual node invocation.
//! - [`EngineError`] — Top-level errors for graph building, validation,
//!   order resolution, and dispatch.

pub mod engine_error;
pub mod node_error;

pub use engine_error::EngineError;
pub use node_error::NodeError;

/// Convenience alias for engine-level results.
pub type EngineResult<T> = Result<T, EngineError>;
/// Convenience alias for node-level results.
pub type NodeResult<T> = Result<T, NodeError>;
