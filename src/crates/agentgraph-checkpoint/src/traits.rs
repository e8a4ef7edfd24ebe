//! Extensible checkpoint storage trait for backend implementations
//!
//! [`CheckpointSaver`] is the core abstraction for checkpoint persistence.
//! The interpreter talks only to this trait; backends decide where bytes
//! land. Two implementations ship with the crate:
//!
//! - [`MemoryCheckpointSaver`](crate::memory::MemoryCheckpointSaver) - the
//!   reference implementation, suitable for tests and ephemeral deployments
//! - [`SqliteCheckpointSaver`](crate::sqlite::SqliteCheckpointSaver) - the
//!   default durable backend, one row per checkpoint keyed by
//!   `(session_id, checkpoint_id)`
//!
//! # Thread safety
//!
//! Implementations must be `Send + Sync` and safe for concurrent `put`/`get`
//! across sessions. Writes within one session are serialized by the caller
//! (the interpreter holds a per-session execution slot), but backends must
//! not corrupt state if that assumption is violated.
//!
//! # Example: custom backend
//!
//! ```rust,ignore
//! use agentgraph_checkpoint::{Checkpoint, CheckpointSaver};
//! use async_trait::async_trait;
//!
//! struct RedisCheckpointSaver { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisCheckpointSaver {
//!     async fn put(&self, checkpoint: Checkpoint) -> agentgraph_checkpoint::Result<()> {
//!         let key = format!("checkpoint:{}:{}", checkpoint.session_id, checkpoint.checkpoint_id);
//!         // SET key <serialized payload>
//!         Ok(())
//!     }
//!     // ... get / latest / list_sessions / delete_session ...
//! }
//! ```

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::error::Result;
use async_trait::async_trait;

/// Core trait for implementing checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist a checkpoint atomically
    ///
    /// Writing the same `(session_id, checkpoint_id)` twice replaces the
    /// stored payload. An I/O fault surfaces as
    /// [`CheckpointError::WriteFailed`](crate::error::CheckpointError::WriteFailed);
    /// callers treat checkpoint loss as recoverable and continue.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch a specific checkpoint
    ///
    /// Returns `Ok(None)` when the checkpoint does not exist; errors are
    /// reserved for storage faults.
    async fn get(&self, session_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// Fetch the most recent checkpoint for a session
    ///
    /// "Most recent" is by creation order within the session.
    async fn latest(&self, session_id: &str) -> Result<Option<(CheckpointId, Checkpoint)>>;

    /// List all sessions with at least one stored checkpoint
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Remove all checkpoints for a session
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}
