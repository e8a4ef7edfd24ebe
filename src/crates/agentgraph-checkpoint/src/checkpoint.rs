//! Core checkpoint data structures for state persistence and resume
//!
//! A [`Checkpoint`] is a complete snapshot of the graph state for one session
//! at a node boundary. Checkpoints are keyed by `(session_id, checkpoint_id)`
//! and carry a format version tag so stored payloads remain self-describing
//! across upgrades.
//!
//! # Lifecycle
//!
//! The interpreter persists a checkpoint after every state merge. On resume
//! (after an interrupt or a process restart) the latest checkpoint for the
//! session is loaded and execution continues from the recorded node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a checkpoint within a session
pub type CheckpointId = String;

/// A write produced by a node that has not yet been folded into a snapshot
///
/// Pending writes survive interrupts: when a node pauses mid-turn, the writes
/// emitted so far are stored alongside the snapshot and replayed on resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    /// Node that produced the write
    pub node: String,
    /// State field the write targets
    pub field: String,
    /// The written value
    pub value: serde_json::Value,
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Session this checkpoint belongs to
    pub session_id: String,

    /// The ID of the checkpoint (unique within the session)
    pub checkpoint_id: CheckpointId,

    /// Serialized graph state at the time of the checkpoint
    pub snapshot: serde_json::Value,

    /// Uncommitted node writes recorded at interrupt time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_writes: Vec<PendingWrite>,

    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,

    /// Additional metadata (step number, source node, custom data)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint for a session
    pub fn new(
        session_id: impl Into<String>,
        checkpoint_id: impl Into<CheckpointId>,
        snapshot: serde_json::Value,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            session_id: session_id.into(),
            checkpoint_id: checkpoint_id.into(),
            snapshot,
            pending_writes: Vec::new(),
            created_at: Utc::now(),
            extra: HashMap::new(),
        }
    }

    /// Create a checkpoint with a freshly generated id
    pub fn with_generated_id(session_id: impl Into<String>, snapshot: serde_json::Value) -> Self {
        Self::new(session_id, Uuid::new_v4().to_string(), snapshot)
    }

    /// Attach pending writes
    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validate the format version tag
    pub fn check_version(&self) -> crate::error::Result<()> {
        if self.v != Self::CURRENT_VERSION {
            return Err(crate::error::CheckpointError::Invalid(format!(
                "unsupported checkpoint version {} (expected {})",
                self.v,
                Self::CURRENT_VERSION
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_creation() {
        let cp = Checkpoint::new("session-1", "cp-1", json!({"status": "processing"}));
        assert_eq!(cp.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(cp.session_id, "session-1");
        assert_eq!(cp.checkpoint_id, "cp-1");
        assert!(cp.pending_writes.is_empty());
        assert!(cp.check_version().is_ok());
    }

    #[test]
    fn test_generated_id_is_unique() {
        let a = Checkpoint::with_generated_id("s", json!({}));
        let b = Checkpoint::with_generated_id("s", json!({}));
        assert_ne!(a.checkpoint_id, b.checkpoint_id);
    }

    #[test]
    fn test_version_check_rejects_future_versions() {
        let mut cp = Checkpoint::new("s", "c", json!({}));
        cp.v = 99;
        assert!(cp.check_version().is_err());
    }

    #[test]
    fn test_pending_writes_roundtrip() {
        let cp = Checkpoint::new("s", "c", json!({})).with_pending_writes(vec![PendingWrite {
            node: "capi_datab".to_string(),
            field: "response_metadata".to_string(),
            value: json!({"datab_skip_human": true}),
        }]);
        let bytes = serde_json::to_vec(&cp).unwrap();
        let restored: Checkpoint = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.pending_writes, cp.pending_writes);
    }
}
