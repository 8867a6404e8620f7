//! Execution state tracking.
//!
//! One [`ExecutionState`] per run, mutated by the dispatcher under a single
//! lock and retained after completion for querying. Node statuses only ever
//! move forward; the overall status turns `Failed` the instant any node
//! fails and stays that way.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-node execution status.
///
/// `Pending → Running → {Completed | Cached | Failed}`, or
/// `Pending → Skipped` for nodes outside the resolved subset. Monotonic —
/// no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Cached,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Cached | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    fn can_transition_to(self, next: NodeStatus) -> bool {
        match self {
            NodeStatus::Pending => matches!(next, NodeStatus::Running | NodeStatus::Skipped),
            NodeStatus::Running => matches!(
                next,
                NodeStatus::Completed | NodeStatus::Cached | NodeStatus::Failed
            ),
            _ => false,
        }
    }
}

/// Overall execution status.
///
/// `Pending → Running → {Completed | Failed | Stopped}`; `Failed` is sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }
}

/// The immutable record of one node's run within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeStatus,
    pub outputs: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cached: bool,
    pub error: Option<String>,
}

/// One line of a run's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: Option<String>,
    pub message: String,
}

/// Full mutable state of one execution, keyed by execution id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub node_statuses: HashMap<String, NodeStatus>,
    pub completed_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub skipped_nodes: Vec<String>,
    pub current_node: Option<String>,
    pub node_results: HashMap<String, NodeExecutionResult>,
    pub node_outputs: HashMap<String, HashMap<String, Value>>,
    pub log: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    fn new(execution_id: &str, node_ids: &[String]) -> Self {
        ExecutionState {
            execution_id: execution_id.to_string(),
            status: ExecutionStatus::Pending,
            node_statuses: node_ids
                .iter()
                .map(|id| (id.clone(), NodeStatus::Pending))
                .collect(),
            completed_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            skipped_nodes: Vec::new(),
            current_node: None,
            node_results: HashMap::new(),
            node_outputs: HashMap::new(),
            log: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn push_log(&mut self, node_id: Option<&str>, message: String) {
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            node_id: node_id.map(str::to_string),
            message,
        });
    }
}

/// Holds every execution's state; shared between the engine, the
/// dispatcher's node tasks, and external queries. All mutation goes through
/// one lock.
#[derive(Default)]
pub struct ExecutionStateTracker {
    states: RwLock<HashMap<String, ExecutionState>>,
    active: RwLock<HashSet<String>>,
}

impl ExecutionStateTracker {
    pub fn new() -> Self {
        ExecutionStateTracker::default()
    }

    /// Register a fresh execution with every node `Pending`.
    pub fn create(&self, execution_id: &str, node_ids: &[String]) {
        let state = ExecutionState::new(execution_id, node_ids);
        self.states.write().insert(execution_id.to_string(), state);
        self.active.write().insert(execution_id.to_string());
    }

    pub fn mark_running(&self, execution_id: &str) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(execution_id) {
            if state.status == ExecutionStatus::Pending {
                state.status = ExecutionStatus::Running;
                state.push_log(None, "execution started".to_string());
            }
        }
    }

    /// Move a node's status forward. Backward transitions are refused and
    /// reported via the return value.
    pub fn set_node_status(&self, execution_id: &str, node_id: &str, status: NodeStatus) -> bool {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(execution_id) else {
            return false;
        };
        let Some(current) = state.node_statuses.get(node_id).copied() else {
            return false;
        };
        if !current.can_transition_to(status) {
            return false;
        }
        state.node_statuses.insert(node_id.to_string(), status);
        if status == NodeStatus::Running {
            state.current_node = Some(node_id.to_string());
        }
        true
    }

    /// Mark nodes excluded from the resolved subset: `Pending → Skipped`,
    /// bypassing `Running`.
    pub fn mark_skipped(&self, execution_id: &str, node_ids: &[String]) {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(execution_id) else {
            return;
        };
        for node_id in node_ids {
            if state.node_statuses.get(node_id) == Some(&NodeStatus::Pending) {
                state
                    .node_statuses
                    .insert(node_id.clone(), NodeStatus::Skipped);
                state.skipped_nodes.push(node_id.clone());
            }
        }
    }

    /// Record a node's terminal result: status, outputs, list membership,
    /// log line. A failure flips the overall status to `Failed` (sticky).
    pub fn record_result(&self, execution_id: &str, result: NodeExecutionResult) {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(execution_id) else {
            return;
        };

        state
            .node_statuses
            .insert(result.node_id.clone(), result.status);

        match result.status {
            NodeStatus::Completed | NodeStatus::Cached => {
                state.completed_nodes.push(result.node_id.clone());
                state
                    .node_outputs
                    .insert(result.node_id.clone(), result.outputs.clone());
                let label = if result.cached { "cache hit" } else { "completed" };
                state.push_log(
                    Some(&result.node_id),
                    format!("{} in {}ms", label, result.duration_ms),
                );
            }
            NodeStatus::Failed => {
                state.failed_nodes.push(result.node_id.clone());
                state.status = ExecutionStatus::Failed;
                state.push_log(
                    Some(&result.node_id),
                    format!(
                        "failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                );
            }
            _ => {}
        }

        state.node_results.insert(result.node_id.clone(), result);
    }

    pub fn append_log(&self, execution_id: &str, node_id: Option<&str>, message: impl Into<String>) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(execution_id) {
            state.push_log(node_id, message.into());
        }
    }

    /// Finish a run. `Failed` and `Stopped` are never overwritten by
    /// `Completed`.
    pub fn finish(&self, execution_id: &str, status: ExecutionStatus) {
        {
            let mut states = self.states.write();
            if let Some(state) = states.get_mut(execution_id) {
                if !state.status.is_terminal() {
                    state.status = status;
                }
                state.finished_at = Some(Utc::now());
                state.current_node = None;
            }
        }
        self.active.write().remove(execution_id);
    }

    /// Cooperative stop: flips a non-terminal run to `Stopped`. Does not
    /// interrupt an in-flight invocation; the dispatcher observes the flag
    /// at its next level boundary.
    pub fn stop(&self, execution_id: &str) -> bool {
        let stopped = {
            let mut states = self.states.write();
            match states.get_mut(execution_id) {
                Some(state) if !state.status.is_terminal() => {
                    state.status = ExecutionStatus::Stopped;
                    state.finished_at = Some(Utc::now());
                    state.push_log(None, "execution stopped".to_string());
                    true
                }
                _ => false,
            }
        };
        if stopped {
            self.active.write().remove(execution_id);
        }
        stopped
    }

    pub fn get_state(&self, execution_id: &str) -> Option<ExecutionState> {
        self.states.read().get(execution_id).cloned()
    }

    /// Terminal snapshot only; `None` while the run is still in flight.
    pub fn get_result(&self, execution_id: &str) -> Option<ExecutionState> {
        self.states
            .read()
            .get(execution_id)
            .filter(|state| state.status.is_terminal())
            .cloned()
    }

    pub fn is_active(&self, execution_id: &str) -> bool {
        self.active.read().contains(execution_id)
    }

    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatus> {
        self.states.read().get(execution_id).map(|s| s.status)
    }

    /// Carry an upstream node's output map over from a previous run
    /// (resume mode). Statuses are untouched; the node stays `Skipped`.
    pub fn seed_outputs(
        &self,
        execution_id: &str,
        node_id: &str,
        outputs: HashMap<String, Value>,
    ) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(execution_id) {
            state.node_outputs.insert(node_id.to_string(), outputs);
        }
    }

    /// Recorded outputs of one node, for downstream input gathering.
    pub fn node_outputs(
        &self,
        execution_id: &str,
        node_id: &str,
    ) -> Option<HashMap<String, Value>> {
        self.states
            .read()
            .get(execution_id)
            .and_then(|state| state.node_outputs.get(node_id).cloned())
    }

    /// Ids of nodes that finished successfully (completed or cache hit).
    pub fn completed_set(&self, execution_id: &str) -> HashSet<String> {
        self.states
            .read()
            .get(execution_id)
            .map(|state| state.completed_nodes.iter().cloned().collect())
            .unwrap_or_default()
    }
}
