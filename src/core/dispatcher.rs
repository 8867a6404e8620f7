//! Node dispatcher — the per-level execution driver.
//!
//! For each level of the resolved plan the dispatcher fans node tasks out
//! onto a bounded worker pool, waits for every task in the level to resolve
//! (success or failure) before releasing the next level, and serializes all
//! shared mutation through the state tracker and the result cache.
//!
//! Per node: gather inputs from recorded upstream outputs → consult the
//! cache → invoke the capability with linear retry → record the result and
//! emit lifecycle events.
//!
//! The execution-wide deadline bounds each level's barrier wait. Exceeding
//! it fails the run but does not forcibly interrupt in-flight invocations;
//! dropping the task set only aborts them at their next await point.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::cache::{invocation_fingerprint, ResultCache};
use crate::core::event_bus::{EventEmitter, WorkflowEvent};
use crate::core::state::{
    ExecutionStateTracker, ExecutionStatus, NodeExecutionResult, NodeStatus,
};
use crate::error::{EngineError, EngineResult, NodeError};
use crate::graph::{Graph, WorkflowEdge, WorkflowNode};
use crate::nodes::{NodeExecutor, NodeExecutorRegistry};
use crate::types::TypeRegistry;

/// Effective options for one run: engine defaults merged with the
/// request's overrides.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub worker_pool_size: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    pub use_cache: bool,
    pub cache_ttl: Duration,
    pub parallel: bool,
    /// `None` means every node type is cacheable.
    pub cacheable_types: Option<HashSet<String>>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            worker_pool_size: 10,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(300),
            use_cache: true,
            cache_ttl: Duration::from_secs(60),
            parallel: true,
            cacheable_types: None,
        }
    }
}

impl DispatchOptions {
    fn is_cacheable(&self, node_type: &str) -> bool {
        self.use_cache
            && self
                .cacheable_types
                .as_ref()
                .map_or(true, |allowlist| allowlist.contains(node_type))
    }
}

/// Drives node execution for one engine. Cheap to clone; every field is
/// shared.
#[derive(Clone)]
pub struct NodeDispatcher {
    registry: Arc<NodeExecutorRegistry>,
    types: Arc<TypeRegistry>,
    cache: Arc<ResultCache>,
    tracker: Arc<ExecutionStateTracker>,
    emitter: EventEmitter,
}

impl NodeDispatcher {
    pub fn new(
        registry: Arc<NodeExecutorRegistry>,
        types: Arc<TypeRegistry>,
        cache: Arc<ResultCache>,
        tracker: Arc<ExecutionStateTracker>,
        emitter: EventEmitter,
    ) -> Self {
        NodeDispatcher {
            registry,
            types,
            cache,
            tracker,
            emitter,
        }
    }

    /// Execute the levels in sequence. Returns the first node failure (or
    /// the timeout) after its level has fully drained; remaining levels are
    /// then not started and their nodes stay `Pending`.
    pub async fn dispatch(
        &self,
        execution_id: &str,
        graph: Arc<Graph>,
        levels: Vec<Vec<String>>,
        options: DispatchOptions,
    ) -> EngineResult<()> {
        let options = Arc::new(options);
        let deadline = Instant::now() + options.timeout;

        for level in levels {
            // 层级边界：协作式停止检查
            if self.tracker.status(execution_id) == Some(ExecutionStatus::Stopped) {
                tracing::debug!(execution_id, "stop requested, skipping remaining levels");
                return Ok(());
            }
            self.run_level(execution_id, &graph, level, &options, deadline)
                .await?;
        }
        Ok(())
    }

    async fn run_level(
        &self,
        execution_id: &str,
        graph: &Arc<Graph>,
        level: Vec<String>,
        options: &Arc<DispatchOptions>,
        deadline: Instant,
    ) -> EngineResult<()> {
        let pool_size = if options.parallel {
            options.worker_pool_size.max(1)
        } else {
            1
        };
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut join_set: JoinSet<(String, EngineResult<()>)> = JoinSet::new();
        let mut pending: HashSet<String> = level.iter().cloned().collect();

        for node_id in level {
            let this = self.clone();
            let graph = Arc::clone(graph);
            let options = Arc::clone(options);
            let semaphore = Arc::clone(&semaphore);
            let execution_id = execution_id.to_string();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let result = this
                    .run_node(&execution_id, &graph, &node_id, &options)
                    .await;
                (node_id, result)
            });
        }

        // Barrier: every node in the level resolves — success or failure —
        // before the next level starts.
        let mut level_error: Option<EngineError> = None;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Err(_) => {
                    return Err(self.timeout_error(execution_id, graph, &pending, options));
                }
                Ok(None) => break,
                Ok(Some(Ok((node_id, result)))) => {
                    pending.remove(&node_id);
                    if let Err(err) = result {
                        level_error.get_or_insert(err);
                    }
                }
                Ok(Some(Err(join_err))) => {
                    level_error.get_or_insert(EngineError::Internal(format!(
                        "node task failed to join: {}",
                        join_err
                    )));
                }
            }
        }

        match level_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn timeout_error(
        &self,
        execution_id: &str,
        graph: &Graph,
        pending: &HashSet<String>,
        options: &DispatchOptions,
    ) -> EngineError {
        let node_id = pending.iter().next().cloned().unwrap_or_default();
        let node_type = graph
            .get_node(&node_id)
            .map(|n| n.node_type.clone())
            .unwrap_or_default();
        let message = format!("execution timed out after {}s", options.timeout.as_secs());
        tracing::error!(execution_id, node_id = %node_id, "{}", message);
        self.tracker.append_log(execution_id, None, message.clone());
        EngineError::NodeExecution {
            node_id,
            node_type,
            error: message,
            detail: None,
        }
    }

    async fn run_node(
        &self,
        execution_id: &str,
        graph: &Graph,
        node_id: &str,
        options: &DispatchOptions,
    ) -> EngineResult<()> {
        let node = graph
            .get_node(node_id)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;

        let started_at = Utc::now();
        let start = std::time::Instant::now();

        self.tracker
            .set_node_status(execution_id, node_id, NodeStatus::Running);
        self.emitter.emit(WorkflowEvent::NodeStarted {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node.node_type.clone(),
            timestamp: started_at,
        });

        let Some(executor) = self.registry.get(&node.node_type) else {
            return Err(self.fail_node(
                execution_id,
                &node,
                started_at,
                start,
                HashMap::new(),
                NodeError::UnknownCapability(node.node_type.clone()),
            ));
        };

        // 1. Gather inputs; conversion failures escalate into the node's
        //    execution error.
        let inputs = match self.gather_inputs(execution_id, graph, node_id) {
            Ok(inputs) => inputs,
            Err(err) => {
                return Err(self.fail_node(
                    execution_id,
                    &node,
                    started_at,
                    start,
                    HashMap::new(),
                    err,
                ))
            }
        };

        // 2. Cache check: a hit short-circuits with zero invocations.
        let fingerprint =
            invocation_fingerprint(&node.node_type, &node.id, &inputs, &node.config);
        if options.is_cacheable(&node.node_type) {
            if let Some(outputs) = self.cache.get(&fingerprint) {
                let finished_at = Utc::now();
                self.tracker.record_result(
                    execution_id,
                    NodeExecutionResult {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                        status: NodeStatus::Cached,
                        outputs: outputs.clone(),
                        started_at,
                        finished_at,
                        duration_ms: start.elapsed().as_millis() as u64,
                        cached: true,
                        error: None,
                    },
                );
                self.emitter.emit(WorkflowEvent::NodeCompleted {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    outputs,
                    cached: true,
                    timestamp: finished_at,
                });
                return Ok(());
            }
        }

        // 3. Invoke with linear retry.
        match Self::invoke_with_retry(
            executor,
            &inputs,
            &node.config,
            options.max_retries,
            options.retry_base_delay,
            &node.id,
        )
        .await
        {
            Ok(outputs) => {
                if options.is_cacheable(&node.node_type) {
                    self.cache.set(&fingerprint, outputs.clone(), options.cache_ttl);
                }
                let finished_at = Utc::now();
                self.tracker.record_result(
                    execution_id,
                    NodeExecutionResult {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                        status: NodeStatus::Completed,
                        outputs: outputs.clone(),
                        started_at,
                        finished_at,
                        duration_ms: start.elapsed().as_millis() as u64,
                        cached: false,
                        error: None,
                    },
                );
                self.emitter.emit(WorkflowEvent::NodeCompleted {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    outputs,
                    cached: false,
                    timestamp: finished_at,
                });
                Ok(())
            }
            Err(err) => {
                Err(self.fail_node(execution_id, &node, started_at, start, inputs, err))
            }
        }
    }

    /// Record a failed result, emit the failure event, and build the
    /// engine-level error that aborts remaining levels.
    fn fail_node(
        &self,
        execution_id: &str,
        node: &WorkflowNode,
        started_at: chrono::DateTime<Utc>,
        start: std::time::Instant,
        inputs: HashMap<String, Value>,
        err: NodeError,
    ) -> EngineError {
        let finished_at = Utc::now();
        tracing::error!(
            execution_id,
            node_id = %node.id,
            node_type = %node.node_type,
            error = %err,
            "node execution failed"
        );
        self.tracker.record_result(
            execution_id,
            NodeExecutionResult {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                status: NodeStatus::Failed,
                outputs: HashMap::new(),
                started_at,
                finished_at,
                duration_ms: start.elapsed().as_millis() as u64,
                cached: false,
                error: Some(err.to_string()),
            },
        );
        self.emitter.emit(WorkflowEvent::NodeFailed {
            execution_id: execution_id.to_string(),
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            error: err.to_string(),
            timestamp: finished_at,
        });

        EngineError::NodeExecution {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            error: err.to_string(),
            detail: serde_json::to_value(&inputs)
                .ok()
                .map(|inputs| serde_json::json!({ "inputs": inputs })),
        }
    }

    /// Merge upstream contributions into the node's input map.
    ///
    /// An upstream node that was skipped or has not run contributes
    /// nothing; downstream nodes may see a partial input map.
    fn gather_inputs(
        &self,
        execution_id: &str,
        graph: &Graph,
        node_id: &str,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let mut inputs = HashMap::new();

        for edge in graph.incoming_edges(node_id) {
            let Some(outputs) = self.tracker.node_outputs(execution_id, &edge.source_id) else {
                continue;
            };

            match (&edge.source_port, &edge.target_port) {
                (Some(source_port), target_port) => {
                    let Some(value) = outputs.get(source_port) else {
                        continue;
                    };
                    let converted = self.convert_for_edge(graph, &edge, value)?;
                    let key = target_port.clone().unwrap_or_else(|| source_port.clone());
                    inputs.insert(key, converted);
                }
                (None, Some(target_port)) => {
                    // 无源端口：整个输出表作为一个对象传入目标端口
                    inputs.insert(
                        target_port.clone(),
                        Value::Object(outputs.into_iter().collect()),
                    );
                }
                (None, None) => {
                    for (key, value) in outputs {
                        inputs.insert(key, value);
                    }
                }
            }
        }

        Ok(inputs)
    }

    /// Runtime conversion for a typed edge: when both endpoint port types
    /// are declared and differ, the value is converted before it reaches
    /// the target's input map.
    fn convert_for_edge(
        &self,
        graph: &Graph,
        edge: &WorkflowEdge,
        value: &Value,
    ) -> Result<Value, NodeError> {
        let source_type = self.port_type(graph, &edge.source_id, edge.source_port.as_deref(), true);
        let target_type = self.port_type(graph, &edge.target_id, edge.target_port.as_deref(), false);

        match (source_type, target_type) {
            (Some(source), Some(target)) if source != target => {
                self.types.convert(value, &source, &target)
            }
            _ => Ok(value.clone()),
        }
    }

    fn port_type(
        &self,
        graph: &Graph,
        node_id: &str,
        port: Option<&str>,
        output_side: bool,
    ) -> Option<String> {
        let node = graph.get_node(node_id)?;
        let metadata = self.registry.metadata(&node.node_type)?;
        let ports = if output_side {
            &metadata.outputs
        } else {
            &metadata.inputs
        };
        let resolved = match port {
            Some(port_id) => ports.iter().find(|p| p.id == port_id),
            None => ports.first(),
        };
        resolved.map(|p| p.port_type.clone())
    }

    async fn invoke_with_retry(
        executor: Arc<dyn NodeExecutor>,
        inputs: &HashMap<String, Value>,
        config: &Value,
        max_retries: u32,
        base_delay: Duration,
        node_id: &str,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let attempts = max_retries.max(1);
        let mut last_error: Option<NodeError> = None;

        for attempt in 1..=attempts {
            match executor.invoke(inputs, config).await {
                Ok(outputs) => return Ok(outputs),
                Err(err) => {
                    if attempt < attempts {
                        // 线性退避：delay = base × attempt
                        let delay = base_delay * attempt;
                        tracing::warn!(
                            node_id,
                            attempt,
                            error = %err,
                            "invocation failed, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| NodeError::Execution("invocation produced no result".to_string())))
    }
}
