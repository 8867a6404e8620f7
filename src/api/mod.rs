pub mod runner;

pub use runner::{
    EngineConfig, ExecutionOptions, ExecutionRequest, ExecutionResponse, WorkflowEngine,
    WorkflowEngineBuilder,
};
