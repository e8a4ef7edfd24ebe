//! Error types for the orchestration runtime

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the orchestration runtime
///
/// Node-level faults never reach this enum; they fold into the graph state
/// and surface as `response_type = error` envelopes. Only infrastructure
/// faults (configuration, storage, session admission) propagate out of the
/// entry points.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Another turn is already in flight for the session
    #[error("Session {0} already has an active execution")]
    SessionBusy(String),

    /// Agent name not present in the registry
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Graph construction or execution infrastructure fault
    #[error("Graph error: {0}")]
    Graph(#[from] agentgraph_core::GraphError),

    /// Checkpoint backend fault
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// Configuration missing or invalid at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session manifest I/O fault
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tooling::ToolingError> for OrchestratorError {
    fn from(err: tooling::ToolingError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}
