use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NodeResult;

/// A named, typed input or output slot on a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub accepts_multiple: bool,
}

impl PortDefinition {
    pub fn new(id: impl Into<String>, port_type: impl Into<String>) -> Self {
        let id = id.into();
        PortDefinition {
            name: id.clone(),
            id,
            port_type: port_type.into(),
            required: false,
            accepts_multiple: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn accepts_multiple(mut self) -> Self {
        self.accepts_multiple = true;
        self
    }
}

/// A declared configuration field of a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// Declarative metadata of a capability: ordered input/output ports and
/// configuration fields. Port order matters — an edge with no port named
/// resolves to the first declared port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub node_type: String,
    pub display_name: String,
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
    #[serde(default)]
    pub config_fields: Vec<ConfigFieldDefinition>,
}

impl NodeMetadata {
    pub fn new(node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        NodeMetadata {
            display_name: node_type.clone(),
            node_type,
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_fields: Vec::new(),
        }
    }

    pub fn with_input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_config_field(mut self, field: ConfigFieldDefinition) -> Self {
        self.config_fields.push(field);
        self
    }

    /// First declared output port, if any.
    pub fn first_output(&self) -> Option<&PortDefinition> {
        self.outputs.first()
    }

    /// First declared input port, if any.
    pub fn first_input(&self) -> Option<&PortDefinition> {
        self.inputs.first()
    }
}

/// Trait for node invocation. Each capability (node type) implements this.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Declarative metadata: ports and config fields.
    fn metadata(&self) -> NodeMetadata;

    /// Execute the capability against resolved inputs and node config.
    async fn invoke(
        &self,
        inputs: &HashMap<String, Value>,
        config: &Value,
    ) -> NodeResult<HashMap<String, Value>>;
}

/// Registry of node executors by node type string.
///
/// Populated explicitly by a bootstrap list; there is no runtime
/// discovery and no process-wide instance.
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        NodeExecutorRegistry {
            executors: HashMap::new(),
        }
    }

    pub fn register(&mut self, node_type: &str, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type.to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }

    pub fn metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.executors.get(node_type).map(|e| e.metadata())
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
