//! # agentgraph-checkpoint - Durable state snapshots for agentgraph
//!
//! Checkpoint persistence for the graph orchestration runtime. Every state
//! merge during a turn produces a [`Checkpoint`] keyed by
//! `(session_id, checkpoint_id)`; the latest checkpoint for a session is the
//! resume point after an interrupt or a process restart.
//!
//! ## Components
//!
//! - [`Checkpoint`] / [`PendingWrite`] - snapshot data structures with a
//!   format version tag
//! - [`CheckpointSaver`] - async storage trait (put / get / latest)
//! - [`MemoryCheckpointSaver`] - in-memory reference backend
//! - [`SqliteCheckpointSaver`] - durable SQLite backend (default)
//! - [`SnapshotSerializer`] - payload encoding protocol (JSON, bincode)
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use agentgraph_checkpoint::{Checkpoint, CheckpointSaver, SqliteCheckpointSaver};
//! use serde_json::json;
//!
//! let saver = SqliteCheckpointSaver::open("data/checkpoints.db").await?;
//! saver.put(Checkpoint::new("session-1", "cp-1", json!({"status": "processing"}))).await?;
//!
//! let (id, checkpoint) = saver.latest("session-1").await?.expect("stored above");
//! ```
//!
//! ## Failure policy
//!
//! Checkpoint loss is recoverable: on `put` failure the interpreter logs and
//! continues; on read failure during resume the runtime reconstructs a seed
//! state from the session manifest instead.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod sqlite;
pub mod traits;

pub use checkpoint::{Checkpoint, CheckpointId, PendingWrite};
pub use error::{CheckpointError, Result};
pub use memory::MemoryCheckpointSaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SnapshotSerializer};
pub use sqlite::SqliteCheckpointSaver;
pub use traits::CheckpointSaver;
