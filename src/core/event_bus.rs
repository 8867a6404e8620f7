use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// 工作流生命周期事件 - 通过事件通道按序传递
///
/// 每个节点的事件严格有序：`node_started` 先于其终态事件；
/// 发送不会阻塞调度器，也不会打乱其状态迁移顺序。
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// 节点开始执行
    NodeStarted {
        execution_id: String,
        node_id: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },

    /// 节点执行完成（cached 标记缓存命中，未真正调用）
    NodeCompleted {
        execution_id: String,
        node_id: String,
        node_type: String,
        outputs: HashMap<String, Value>,
        cached: bool,
        timestamp: DateTime<Utc>,
    },

    /// 节点执行失败
    #[serde(rename = "node_error")]
    NodeFailed {
        execution_id: String,
        node_id: String,
        node_type: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// 工作流完成
    ExecutionCompleted {
        execution_id: String,
        outputs: HashMap<String, HashMap<String, Value>>,
        timestamp: DateTime<Utc>,
    },

    /// 工作流失败
    #[serde(rename = "execution_error")]
    ExecutionFailed {
        execution_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// 事件发送器
pub type EventSender = mpsc::UnboundedSender<WorkflowEvent>;

/// 事件接收器
pub type EventReceiver = mpsc::UnboundedReceiver<WorkflowEvent>;

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Cheap-to-clone wrapper around the event channel; a disabled emitter
/// drops events without allocating a channel.
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<EventSender>,
}

impl EventEmitter {
    pub fn new(tx: EventSender) -> Self {
        EventEmitter { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        EventEmitter { tx: None }
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel() {
        let (sender, mut receiver) = create_event_channel();

        sender
            .send(WorkflowEvent::NodeStarted {
                execution_id: "run1".to_string(),
                node_id: "node1".to_string(),
                node_type: "transform".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        let event = receiver.recv().await.unwrap();
        match event {
            WorkflowEvent::NodeStarted { node_id, .. } => {
                assert_eq!(node_id, "node1");
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = WorkflowEvent::NodeFailed {
            execution_id: "run1".to_string(),
            node_id: "n".to_string(),
            node_type: "t".to_string(),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "node_error");

        let event = WorkflowEvent::ExecutionFailed {
            execution_id: "run1".to_string(),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "execution_error");
    }

    #[test]
    fn test_disabled_emitter_drops_events() {
        let emitter = EventEmitter::disabled();
        assert!(!emitter.is_active());
        emitter.emit(WorkflowEvent::ExecutionCompleted {
            execution_id: "run1".to_string(),
            outputs: HashMap::new(),
            timestamp: Utc::now(),
        });
    }
}
