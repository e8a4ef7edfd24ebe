//! Error types for graph construction and execution

use crate::interrupt::Interrupt;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building or executing a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure failed validation
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// A node referenced by an edge or resolver does not exist
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A node reported a failure
    ///
    /// Node faults are normally folded into the state's error list and
    /// routed to `assemble`; this variant is the transport between the node
    /// and the interpreter, it does not escape `stream()`.
    #[error("Node {node} failed: {message}")]
    NodeFailed { node: String, message: String },

    /// A node exceeded its execution timeout
    #[error("Node {node} timed out after {timeout_ms}ms")]
    NodeTimeout { node: String, timeout_ms: u64 },

    /// The whole turn exceeded its deadline
    #[error("Turn exceeded deadline of {timeout_ms}ms")]
    TurnTimeout { timeout_ms: u64 },

    /// A node requested a cooperative pause
    #[error("Execution interrupted at node {}", .0.node)]
    Interrupted(Interrupt),

    /// Execution was cancelled by an external signal
    #[error("Execution cancelled")]
    Cancelled,

    /// Checkpoint backend fault
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// State (de)serialization fault
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Short machine-readable code for the state error list
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::InvalidGraph(_) => "invalid_graph",
            GraphError::UnknownNode(_) => "unknown_node",
            GraphError::NodeFailed { .. } => "node_failed",
            GraphError::NodeTimeout { .. } => "node_timeout",
            GraphError::TurnTimeout { .. } => "turn_timeout",
            GraphError::Interrupted(_) => "interrupt_pending",
            GraphError::Cancelled => "cancelled",
            GraphError::Checkpoint(_) => "checkpoint_error",
            GraphError::Serialization(_) => "serialization_error",
        }
    }
}
