pub mod builder;
pub mod traversal;
pub mod types;
pub mod validator;

pub use builder::{build_graph, Graph};
pub use traversal::{ancestors, topological_sort};
pub use types::{NodeIndexMap, WorkflowEdge, WorkflowNode};
pub use validator::{validate_connections, Diagnostic, DiagnosticLevel, ValidationReport};
