//! Error types for the graph engine

use thiserror::Error;

/// Result type alias using CeresError
pub type Result<T> = std::result::Result<T, CeresError>;

/// Errors that can occur while building, compiling or executing a graph
#[derive(Debug, Error)]
pub enum CeresError {
    /// Dependency-path nodes form a cycle; the compile is aborted
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// The graph has not been compiled (or its last compile failed)
    #[error("Graph '{0}' is not compiled")]
    NotCompiled(String),

    /// No entry node matches the requested event name or guid
    #[error("No entry node for '{0}'")]
    UnknownEntry(String),

    /// A node guid could not be found
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A port could not be found on a node
    #[error("Unknown port '{port}' on node '{node}'")]
    UnknownPort { node: String, port: String },

    /// Two ports have the same direction
    #[error("Cannot link '{from}' to '{to}': ports have the same direction")]
    InvalidDirection { from: String, to: String },

    /// Port types differ and no conversion is registered
    #[error("Incompatible port types: {from} -> {to}")]
    IncompatiblePorts { from: String, to: String },

    /// Binding a variable would form a forwarding cycle
    #[error("Variable binding error: {0}")]
    VariableBinding(String),

    /// A node type could not be resolved while deserializing
    #[error("Cannot resolve node type '{0}'")]
    TypeResolution(String),

    /// A custom function could not be found
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Nested forward execution went deeper than the configured limit
    #[error("Forward depth limit exceeded ({0})")]
    ForwardDepthExceeded(usize),

    /// A dispatch executed more nodes than the configured limit
    #[error("Execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    /// Node execution failed
    #[error("Node execution failed: {0}")]
    ExecutionFailed(String),

    /// An awaited operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CeresError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether this error is a structural compile-time failure
    pub fn is_compile_fatal(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_message() {
        let err = CeresError::CircularDependency {
            chain: vec!["x".to_string(), "y".to_string(), "x".to_string()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: x -> y -> x");
        assert!(err.is_compile_fatal());
        assert!(!CeresError::Cancelled.is_compile_fatal());
    }
}
