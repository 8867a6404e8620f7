pub mod dispatcher;
pub mod event_bus;
pub mod levels;
pub mod order;
pub mod state;

pub use dispatcher::{DispatchOptions, NodeDispatcher};
pub use event_bus::{
    create_event_channel, EventEmitter, EventReceiver, EventSender, WorkflowEvent,
};
pub use levels::group_into_levels;
pub use order::{resolve_execution_order, ExecutionMode};
pub use state::{
    ExecutionState, ExecutionStateTracker, ExecutionStatus, LogEntry, NodeExecutionResult,
    NodeStatus,
};
