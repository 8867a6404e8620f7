pub mod executor;

pub use executor::{
    ConfigFieldDefinition, NodeExecutor, NodeExecutorRegistry, NodeMetadata, PortDefinition,
};
