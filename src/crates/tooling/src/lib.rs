//! Shared tooling utilities for the capi-agentes workspace
//!
//! This crate carries the ambient concerns the orchestration crates lean on:
//!
//! - `config` - Environment variable loading with typed parsing
//! - `async_utils` - Retry policies for external-I/O boundaries and deadline
//!   wrappers for node execution
//! - `logging` - Turn instrumentation helpers built on `tracing`

pub mod async_utils;
pub mod config;
pub mod logging;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// General error with message
    #[error("Tooling error: {0}")]
    General(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
