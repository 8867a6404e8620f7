use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 图节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// 节点 ID（提交内唯一）
    pub id: String,

    /// 节点类型（能力键，如 http-request, transform 等）
    #[serde(rename = "type")]
    pub node_type: String,

    /// 节点配置
    #[serde(default)]
    pub config: Value,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        WorkflowNode {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }
}

/// 图边 - 从源节点输出端口到目标节点输入端口的有向连接
///
/// 端口可选：缺省表示"第一个声明的端口"（校验时）或"整个输出表"（取值时）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// 源节点 ID
    pub source_id: String,

    /// 源输出端口
    #[serde(default)]
    pub source_port: Option<String>,

    /// 目标节点 ID
    pub target_id: String,

    /// 目标输入端口
    #[serde(default)]
    pub target_port: Option<String>,
}

impl WorkflowEdge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        WorkflowEdge {
            source_id: source_id.into(),
            source_port: None,
            target_id: target_id.into(),
            target_port: None,
        }
    }

    pub fn with_ports(
        source_id: impl Into<String>,
        source_port: impl Into<String>,
        target_id: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        WorkflowEdge {
            source_id: source_id.into(),
            source_port: Some(source_port.into()),
            target_id: target_id.into(),
            target_port: Some(target_port.into()),
        }
    }

    /// 连接的显示标签，用于诊断信息
    pub fn label(&self) -> String {
        format!("{} -> {}", self.source_id, self.target_id)
    }
}

/// 节点 ID 到 petgraph NodeIndex 的映射
pub type NodeIndexMap = std::collections::HashMap<String, NodeIndex>;
