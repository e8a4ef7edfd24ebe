//! SQLite checkpoint saver
//!
//! Default durable backend. One row per checkpoint:
//!
//! ```sql
//! CREATE TABLE checkpoints (
//!     session_id    TEXT NOT NULL,
//!     checkpoint_id TEXT NOT NULL,
//!     payload       BLOB NOT NULL,
//!     created_at    TIMESTAMP NOT NULL,
//!     PRIMARY KEY (session_id, checkpoint_id)
//! )
//! ```
//!
//! The payload is the serialized [`Checkpoint`] (JSON by default), which
//! carries its own version tag. Writes within a session are serialized by a
//! per-session lock; sessions write concurrently through the pool.

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SnapshotSerializer};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite-backed checkpoint saver
pub struct SqliteCheckpointSaver<S: SnapshotSerializer = JsonSerializer> {
    pool: SqlitePool,
    serializer: S,
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SqliteCheckpointSaver<JsonSerializer> {
    /// Open (or create) the checkpoint database at the given path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_serializer(path, JsonSerializer::new()).await
    }
}

impl<S: SnapshotSerializer> SqliteCheckpointSaver<S> {
    /// Open the checkpoint database with a custom payload serializer
    pub async fn open_with_serializer(path: impl AsRef<Path>, serializer: S) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let saver = Self {
            pool,
            serializer,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        };
        saver.init_schema().await?;
        Ok(saver)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id    TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                payload       BLOB NOT NULL,
                created_at    TIMESTAMP NOT NULL,
                PRIMARY KEY (session_id, checkpoint_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn decode(&self, payload: &[u8]) -> Result<Checkpoint> {
        let checkpoint: Checkpoint = self.serializer.loads(payload)?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }
}

#[async_trait]
impl<S: SnapshotSerializer> CheckpointSaver for SqliteCheckpointSaver<S> {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let payload = self.serializer.dumps(&checkpoint)?;
        let lock = self.session_lock(&checkpoint.session_id).await;
        let _guard = lock.lock().await;

        sqlx::query(
            "INSERT INTO checkpoints (session_id, checkpoint_id, payload, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (session_id, checkpoint_id)
             DO UPDATE SET payload = excluded.payload, created_at = excluded.created_at",
        )
        .bind(&checkpoint.session_id)
        .bind(&checkpoint.checkpoint_id)
        .bind(&payload)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, session_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT payload FROM checkpoints WHERE session_id = ? AND checkpoint_id = ?",
        )
        .bind(session_id)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: Vec<u8> = row.get("payload");
                Ok(Some(self.decode(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn latest(&self, session_id: &str) -> Result<Option<(CheckpointId, Checkpoint)>> {
        let row = sqlx::query(
            "SELECT checkpoint_id, payload FROM checkpoints
             WHERE session_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: String = row.get("checkpoint_id");
                let payload: Vec<u8> = row.get("payload");
                Ok(Some((id, self.decode(&payload)?)))
            }
            None => Ok(None),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT DISTINCT session_id FROM checkpoints ORDER BY session_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("session_id"))
            .collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteCheckpointSaver) {
        let dir = TempDir::new().unwrap();
        let saver = SqliteCheckpointSaver::open(dir.path().join("checkpoints.db"))
            .await
            .unwrap();
        (dir, saver)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, saver) = open_temp().await;
        let cp = Checkpoint::new("s", "cp-1", json!({"status": "processing", "loop_count": 1}));
        saver.put(cp.clone()).await.unwrap();

        let loaded = saver.get("s", "cp-1").await.unwrap().unwrap();
        assert_eq!(loaded.snapshot, cp.snapshot);
        assert_eq!(loaded.v, Checkpoint::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_roundtrip_is_byte_exact() {
        let (_dir, saver) = open_temp().await;
        let serializer = JsonSerializer::new();
        let cp = Checkpoint::new("s", "cp-1", json!({"rows": [1, 2, 3]}));
        let original_bytes = serializer.dumps(&cp).unwrap();

        saver.put(cp).await.unwrap();
        let (_, loaded) = saver.latest("s").await.unwrap().unwrap();
        let loaded_bytes = serializer.dumps(&loaded).unwrap();

        assert_eq!(original_bytes, loaded_bytes);
    }

    #[tokio::test]
    async fn test_upsert_replaces_payload() {
        let (_dir, saver) = open_temp().await;
        saver
            .put(Checkpoint::new("s", "cp-1", json!({"step": 1})))
            .await
            .unwrap();
        saver
            .put(Checkpoint::new("s", "cp-1", json!({"step": 2})))
            .await
            .unwrap();

        let loaded = saver.get("s", "cp-1").await.unwrap().unwrap();
        assert_eq!(loaded.snapshot, json!({"step": 2}));
    }

    #[tokio::test]
    async fn test_latest_prefers_newest() {
        let (_dir, saver) = open_temp().await;
        let mut first = Checkpoint::new("s", "cp-1", json!({"step": 1}));
        first.created_at = chrono::Utc::now() - chrono::Duration::seconds(10);
        saver.put(first).await.unwrap();
        saver
            .put(Checkpoint::new("s", "cp-2", json!({"step": 2})))
            .await
            .unwrap();

        let (id, _) = saver.latest("s").await.unwrap().unwrap();
        assert_eq!(id, "cp-2");
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints.db");
        {
            let saver = SqliteCheckpointSaver::open(&path).await.unwrap();
            saver
                .put(Checkpoint::new("s", "cp-1", json!({"persisted": true})))
                .await
                .unwrap();
        }

        let reopened = SqliteCheckpointSaver::open(&path).await.unwrap();
        let (_, cp) = reopened.latest("s").await.unwrap().unwrap();
        assert_eq!(cp.snapshot, json!({"persisted": true}));
    }

    #[tokio::test]
    async fn test_list_and_delete_sessions() {
        let (_dir, saver) = open_temp().await;
        saver
            .put(Checkpoint::new("a", "cp-1", json!({})))
            .await
            .unwrap();
        saver
            .put(Checkpoint::new("b", "cp-1", json!({})))
            .await
            .unwrap();

        assert_eq!(saver.list_sessions().await.unwrap(), vec!["a", "b"]);

        saver.delete_session("a").await.unwrap();
        assert_eq!(saver.list_sessions().await.unwrap(), vec!["b"]);
    }
}
