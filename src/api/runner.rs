//! High-level workflow engine and builder.
//!
//! [`WorkflowEngine`] (constructed via [`WorkflowEngineBuilder`]) is the
//! main entry point: it owns the executor registry, the type registry, the
//! result cache, and the state tracker, and wires them into the graph
//! builder, validator, order resolver, level grouper, and dispatcher for
//! each submitted request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{CacheStats, ResultCache};
use crate::core::dispatcher::{DispatchOptions, NodeDispatcher};
use crate::core::event_bus::{create_event_channel, EventEmitter, EventReceiver, WorkflowEvent};
use crate::core::levels::group_into_levels;
use crate::core::order::{resolve_execution_order, ExecutionMode};
use crate::core::state::{
    ExecutionState, ExecutionStateTracker, ExecutionStatus, LogEntry, NodeExecutionResult,
};
use crate::error::{EngineError, EngineResult};
use crate::graph::{
    build_graph, topological_sort, validate_connections, ValidationReport, WorkflowEdge,
    WorkflowNode,
};
use crate::nodes::NodeExecutorRegistry;
use crate::types::TypeRegistry;

/// Engine-level defaults, overridable per request via [`ExecutionOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_parallel_enabled")]
    pub parallel: bool,
    /// Explicit allowlist of cacheable node types; `None` means all types
    /// are cacheable.
    #[serde(default)]
    pub cacheable_types: Option<HashSet<String>>,
}

fn default_worker_pool_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_execution_timeout_secs() -> u64 {
    300
}
fn default_use_cache() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_cache_max_size() -> usize {
    1000
}
fn default_parallel_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_pool_size: default_worker_pool_size(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            execution_timeout_secs: default_execution_timeout_secs(),
            use_cache: default_use_cache(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_size: default_cache_max_size(),
            parallel: default_parallel_enabled(),
            cacheable_types: None,
        }
    }
}

/// Per-request overrides; unset fields fall back to the engine config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOptions {
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One execution submission: the workflow, the mode, and the options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub selected_nodes: Vec<String>,
    #[serde(default)]
    pub resume_from_node: Option<String>,
    #[serde(default)]
    pub previous_execution_id: Option<String>,
    #[serde(default)]
    pub options: ExecutionOptions,
}

impl ExecutionRequest {
    /// A full-mode request with default options.
    pub fn full(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        ExecutionRequest {
            nodes,
            edges,
            execution_mode: ExecutionMode::Full,
            selected_nodes: Vec::new(),
            resume_from_node: None,
            previous_execution_id: None,
            options: ExecutionOptions::default(),
        }
    }
}

/// The final, queryable snapshot of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub node_outputs: HashMap<String, HashMap<String, Value>>,
    pub node_results: HashMap<String, NodeExecutionResult>,
    pub log: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl ExecutionResponse {
    fn from_state(state: ExecutionState) -> Self {
        let duration_ms = state
            .finished_at
            .map(|finished| (finished - state.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        ExecutionResponse {
            execution_id: state.execution_id,
            status: state.status,
            node_outputs: state.node_outputs,
            node_results: state.node_results,
            log: state.log,
            started_at: state.started_at,
            finished_at: state.finished_at,
            duration_ms,
        }
    }
}

/// The workflow execution engine.
///
/// All collaborators (executor registry, type registry, cache, tracker)
/// are owned values injected at construction time.
pub struct WorkflowEngine {
    registry: Arc<NodeExecutorRegistry>,
    types: Arc<TypeRegistry>,
    cache: Arc<ResultCache>,
    tracker: Arc<ExecutionStateTracker>,
    config: EngineConfig,
    emitter: EventEmitter,
    event_rx: Mutex<Option<EventReceiver>>,
}

impl WorkflowEngine {
    /// Create a new builder.
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            registry: NodeExecutorRegistry::new(),
            types: TypeRegistry::with_builtin_types(),
            config: EngineConfig::default(),
            collect_events: true,
        }
    }

    /// Execute a submitted workflow.
    ///
    /// Pre-flight failures — graph build, cycles, validation issues, bad
    /// mode parameters — return `Err` before any node runs. Once an
    /// execution id exists the call returns `Ok` with the final snapshot,
    /// whose `status` reports runtime failure or stop; the same snapshot
    /// stays retrievable through [`get_result`](Self::get_result).
    pub async fn execute(&self, request: ExecutionRequest) -> EngineResult<ExecutionResponse> {
        let graph = build_graph(&request.nodes, &request.edges)?;

        let report =
            validate_connections(&request.nodes, &request.edges, &self.registry, &self.types);
        if !report.is_valid {
            return Err(EngineError::ValidationFailed(Box::new(report)));
        }

        let full_order = topological_sort(&graph)?;

        let previous_state = if request.execution_mode == ExecutionMode::Resume {
            request
                .previous_execution_id
                .as_deref()
                .and_then(|prev_id| self.tracker.get_state(prev_id))
        } else {
            None
        };
        let previous_completed = previous_state.as_ref().map(|state| {
            state
                .completed_nodes
                .iter()
                .cloned()
                .collect::<HashSet<String>>()
        });

        let subset = resolve_execution_order(
            &graph,
            &full_order,
            request.execution_mode,
            &request.selected_nodes,
            request.resume_from_node.as_deref(),
            previous_completed.as_ref(),
        )?;

        let execution_id = Uuid::new_v4().to_string();
        self.tracker.create(&execution_id, &full_order);

        let subset_set: HashSet<&str> = subset.iter().map(String::as_str).collect();
        let skipped: Vec<String> = full_order
            .iter()
            .filter(|id| !subset_set.contains(id.as_str()))
            .cloned()
            .collect();
        self.tracker.mark_skipped(&execution_id, &skipped);

        // Resume mode: completed ancestors outside the subset contribute
        // their previous outputs to downstream input gathering.
        if let Some(prev) = &previous_state {
            for (node_id, outputs) in &prev.node_outputs {
                if !subset_set.contains(node_id.as_str()) {
                    self.tracker
                        .seed_outputs(&execution_id, node_id, outputs.clone());
                }
            }
        }

        self.tracker.mark_running(&execution_id);

        let levels = group_into_levels(&graph, &subset);
        let options = self.effective_options(&request.options);

        tracing::debug!(
            execution_id,
            nodes = subset.len(),
            levels = levels.len(),
            skipped = skipped.len(),
            "dispatching execution"
        );

        let dispatcher = NodeDispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.types),
            Arc::clone(&self.cache),
            Arc::clone(&self.tracker),
            self.emitter.clone(),
        );

        let outcome = dispatcher
            .dispatch(&execution_id, Arc::new(graph), levels, options)
            .await;

        match outcome {
            Ok(()) => self.tracker.finish(&execution_id, ExecutionStatus::Completed),
            Err(ref err) => {
                self.tracker
                    .append_log(&execution_id, None, err.to_string());
                self.tracker.finish(&execution_id, ExecutionStatus::Failed);
            }
        }

        let state = self.tracker.get_state(&execution_id).ok_or_else(|| {
            EngineError::Internal(format!("state missing for execution {}", execution_id))
        })?;

        match state.status {
            ExecutionStatus::Completed => self.emitter.emit(WorkflowEvent::ExecutionCompleted {
                execution_id: execution_id.clone(),
                outputs: state.node_outputs.clone(),
                timestamp: Utc::now(),
            }),
            ExecutionStatus::Failed => self.emitter.emit(WorkflowEvent::ExecutionFailed {
                execution_id: execution_id.clone(),
                error: state
                    .log
                    .last()
                    .map(|entry| entry.message.clone())
                    .unwrap_or_else(|| "execution failed".to_string()),
                timestamp: Utc::now(),
            }),
            _ => {}
        }

        Ok(ExecutionResponse::from_state(state))
    }

    /// Pre-flight connection validation without executing anything.
    pub fn validate(&self, nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> ValidationReport {
        validate_connections(nodes, edges, &self.registry, &self.types)
    }

    /// Current (possibly in-flight) state of an execution.
    pub fn get_state(&self, execution_id: &str) -> Option<ExecutionState> {
        self.tracker.get_state(execution_id)
    }

    /// Terminal snapshot of an execution; `None` while still running.
    pub fn get_result(&self, execution_id: &str) -> Option<ExecutionResponse> {
        self.tracker
            .get_result(execution_id)
            .map(ExecutionResponse::from_state)
    }

    pub fn is_active(&self, execution_id: &str) -> bool {
        self.tracker.is_active(execution_id)
    }

    /// Request a cooperative stop. The dispatcher honors the flag at its
    /// next level boundary; an in-flight invocation is not interrupted.
    pub fn stop(&self, execution_id: &str) -> bool {
        self.tracker.stop(execution_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// External maintenance trigger for the cache sweep.
    pub fn cleanup_expired_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Take the lifecycle event receiver. Returns `None` after the first
    /// call or when the engine was built with events disabled.
    pub fn take_event_receiver(&self) -> Option<EventReceiver> {
        self.event_rx.lock().take()
    }

    fn effective_options(&self, overrides: &ExecutionOptions) -> DispatchOptions {
        DispatchOptions {
            worker_pool_size: self.config.worker_pool_size,
            max_retries: overrides.max_retries.unwrap_or(self.config.max_retries),
            retry_base_delay: Duration::from_millis(self.config.retry_base_delay_ms),
            timeout: Duration::from_secs(
                overrides
                    .timeout_secs
                    .unwrap_or(self.config.execution_timeout_secs),
            ),
            use_cache: overrides.use_cache.unwrap_or(self.config.use_cache),
            cache_ttl: overrides
                .cache_ttl_ms
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(self.config.cache_ttl_secs)),
            parallel: overrides.parallel.unwrap_or(self.config.parallel),
            cacheable_types: self.config.cacheable_types.clone(),
        }
    }
}

/// Builder for configuring a [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    registry: NodeExecutorRegistry,
    types: TypeRegistry,
    config: EngineConfig,
    collect_events: bool,
}

impl WorkflowEngineBuilder {
    /// Set the capability registry (the explicit bootstrap list of node
    /// executors).
    pub fn executor_registry(mut self, registry: NodeExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the type registry used for connection checking and conversion.
    pub fn type_registry(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Set the engine configuration (pool size, retries, timeouts, cache).
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable lifecycle event collection.
    pub fn collect_events(mut self, collect: bool) -> Self {
        self.collect_events = collect;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let (emitter, event_rx) = if self.collect_events {
            let (tx, rx) = create_event_channel();
            (EventEmitter::new(tx), Some(rx))
        } else {
            (EventEmitter::disabled(), None)
        };

        WorkflowEngine {
            registry: Arc::new(self.registry),
            types: Arc::new(self.types),
            cache: Arc::new(ResultCache::new(self.config.cache_max_size)),
            tracker: Arc::new(ExecutionStateTracker::new()),
            config: self.config,
            emitter,
            event_rx: Mutex::new(event_rx),
        }
    }
}
