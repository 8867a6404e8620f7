//! # NodeFlow — a workflow-graph execution engine
//!
//! `nodeflow` executes directed acyclic graphs of typed "nodes" (units of
//! work) joined by "connections". Callers submit nodes and edges, pick an
//! execution mode, and the engine takes care of:
//!
//! - **Graph construction & validation**: unknown edge endpoints and cyclic
//!   graphs are rejected before anything runs; connection types are checked
//!   against each capability's declared ports and the aggregate diagnostic
//!   list gates execution.
//! - **Level scheduling**: the resolved node subset is partitioned into
//!   dependency levels; nodes within a level run in parallel on a bounded
//!   worker pool, levels run strictly in sequence.
//! - **Execution modes**: `full` (everything), `partial` (selected nodes
//!   plus their transitive dependencies), `resume` (continue from a node,
//!   splicing in ancestors a prior run did not complete).
//! - **Caching**: invocation results are stored in a TTL+LRU cache keyed by
//!   a fingerprint of node type, id, inputs, and config.
//! - **Retry**: failed invocations are retried with a linear backoff
//!   (`delay = base × attempt`), and the last error is surfaced once
//!   retries are exhausted.
//! - **Type compatibility**: a rule/hierarchy-driven engine decides whether
//!   two port types can be connected and performs conversions at runtime.
//! - **State tracking & events**: per-run, per-node statuses, results, and
//!   logs are queryable after completion; an ordered event channel reports
//!   the node lifecycle (`started → cache-hit | completed | failed`).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nodeflow::{ExecutionRequest, NodeExecutorRegistry, TypeRegistry, WorkflowEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = WorkflowEngine::builder()
//!         .executor_registry(NodeExecutorRegistry::new())
//!         .type_registry(TypeRegistry::with_builtin_types())
//!         .build();
//!
//!     let json = std::fs::read_to_string("request.json").unwrap();
//!     let request: ExecutionRequest = serde_json::from_str(&json).unwrap();
//!     let response = engine.execute(request).await.unwrap();
//!     println!("{:?} {:?}", response.status, response.node_outputs);
//! }
//! ```

pub mod api;
pub mod cache;
pub mod core;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod types;

pub use crate::api::{
    EngineConfig, ExecutionOptions, ExecutionRequest, ExecutionResponse, WorkflowEngine,
    WorkflowEngineBuilder,
};
pub use crate::cache::{invocation_fingerprint, CacheStats, ResultCache};
pub use crate::core::{
    create_event_channel, group_into_levels, resolve_execution_order, EventReceiver, EventSender,
    ExecutionMode, ExecutionState, ExecutionStateTracker, ExecutionStatus, LogEntry,
    NodeExecutionResult, NodeStatus, WorkflowEvent,
};
pub use crate::error::{EngineError, EngineResult, NodeError, NodeResult};
pub use crate::graph::{
    build_graph, topological_sort, Diagnostic, DiagnosticLevel, Graph, ValidationReport,
    WorkflowEdge, WorkflowNode,
};
pub use crate::nodes::{
    ConfigFieldDefinition, NodeExecutor, NodeExecutorRegistry, NodeMetadata, PortDefinition,
};
pub use crate::types::{
    Compatibility, ConversionKind, Converter, TypeCategory, TypeDefinition, TypeRegistry, TypeRule,
};
