//! In-memory checkpoint saver
//!
//! Reference implementation storing all checkpoints in process memory.
//! Suitable for development, tests, and deployments that accept losing
//! resume capability on restart.

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::error::Result;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage, one ordered vec per session
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl MemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Total number of checkpoints across all sessions
    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.values().map(Vec::len).sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for MemoryCheckpointSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        let entries = storage
            .entry(checkpoint.session_id.clone())
            .or_insert_with(Vec::new);
        // Replace an existing checkpoint with the same id, preserving order
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.checkpoint_id == checkpoint.checkpoint_id)
        {
            *existing = checkpoint;
        } else {
            entries.push(checkpoint);
        }
        Ok(())
    }

    async fn get(&self, session_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(session_id).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.checkpoint_id == checkpoint_id)
                .cloned()
        }))
    }

    async fn latest(&self, session_id: &str) -> Result<Option<(CheckpointId, Checkpoint)>> {
        let storage = self.storage.read().await;
        Ok(storage.get(session_id).and_then(|entries| {
            entries
                .last()
                .map(|e| (e.checkpoint_id.clone(), e.clone()))
        }))
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut sessions: Vec<String> = storage.keys().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.storage.write().await.remove(session_id);
        Ok(())
    }
}
