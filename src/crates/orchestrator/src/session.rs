//! Session manifest store
//!
//! One JSON manifest per session records the audit trail of the last turn,
//! export artifacts, and a bounded history of conversation turns. The
//! manifest doubles as the reconstruction source when a checkpoint read
//! fails during resume.
//!
//! Writes are atomic (temp-file-then-rename) and serialized per session by
//! an async lock; a manifest is never read during a concurrent write.

use crate::error::{OrchestratorError, Result};
use crate::workspace::{sanitize_session_id, Workspace};
use agentgraph_core::{GraphState, TurnRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// Maximum conversation turns retained per manifest
const HISTORY_LIMIT: usize = 20;

/// One recorded conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestTurn {
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Per-session manifest file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionManifest {
    pub session_id: String,
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    #[serde(default)]
    pub last_response: String,
    #[serde(default)]
    pub datab_exports: Vec<String>,
    #[serde(default)]
    pub last_progress_steps: Vec<String>,
    #[serde(default)]
    pub history: Vec<ManifestTurn>,
    #[serde(default)]
    pub last_metadata: Map<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Store managing manifest files under the workspace
pub struct SessionManifestStore {
    workspace: Workspace,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManifestStore {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(sanitize_session_id(session_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist a manifest snapshot derived from the final state of a turn
    ///
    /// Appends the user query and agent reply to the bounded history and
    /// collects export paths from `response_data`.
    pub async fn update_from_state(&self, state: &GraphState) -> Result<()> {
        let lock = self.session_lock(&state.session_id).await;
        let _guard = lock.lock().await;

        let mut manifest = self
            .read_manifest(&state.session_id)
            .await?
            .unwrap_or_else(|| SessionManifest {
                session_id: state.session_id.clone(),
                ..SessionManifest::default()
            });

        manifest.completed_nodes = state.completed_nodes.clone();
        manifest.last_response = state.response_message.clone();
        manifest.last_progress_steps = state.completed_nodes.clone();
        manifest.last_metadata = state.response_metadata.clone();

        for key in ["datab_export", "export_path"] {
            if let Some(path) = state.response_data.get(key).and_then(Value::as_str) {
                if !manifest.datab_exports.iter().any(|p| p == path) {
                    manifest.datab_exports.push(path.to_string());
                }
            }
        }

        if !state.original_query.is_empty() {
            manifest.history.push(ManifestTurn {
                role: TurnRole::User,
                content: state.original_query.clone(),
                created_at: Utc::now(),
            });
        }
        if !state.response_message.is_empty() {
            manifest.history.push(ManifestTurn {
                role: TurnRole::Agent,
                content: state.response_message.clone(),
                created_at: Utc::now(),
            });
        }
        if manifest.history.len() > HISTORY_LIMIT {
            let excess = manifest.history.len() - HISTORY_LIMIT;
            manifest.history.drain(..excess);
        }

        manifest.updated_at = Some(Utc::now());

        let path = self.workspace.manifest_path(&state.session_id);
        let contents = serde_json::to_vec_pretty(&manifest)?;
        self.workspace.write_atomic(&path, &contents).await?;
        Ok(())
    }

    /// Load a session manifest, if one exists
    pub async fn get_manifest(&self, session_id: &str) -> Result<Option<SessionManifest>> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.read_manifest(session_id).await
    }

    async fn read_manifest(&self, session_id: &str) -> Result<Option<SessionManifest>> {
        let path = self.workspace.manifest_path(session_id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let manifest = serde_json::from_slice(&bytes).map_err(|e| {
                    OrchestratorError::Manifest(format!(
                        "manifest for {} is corrupt: {}",
                        session_id, e
                    ))
                })?;
                Ok(Some(manifest))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Session ids with a stored manifest
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let dir = self.workspace.sessions_dir();
        let mut sessions = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name
                .strip_prefix("session_")
                .and_then(|n| n.strip_suffix(".json"))
            {
                sessions.push(stem.to_string());
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Remove a session's manifest
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        let path = self.workspace.manifest_path(session_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild a seed state from the manifest when checkpoints are unreadable
    ///
    /// The reconstruction is lossy: it restores the audit trail, the last
    /// response, and the metadata needed for a manual human-gate resume.
    pub async fn rebuild_state(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<GraphState>> {
        let Some(manifest) = self.get_manifest(session_id).await? else {
            return Ok(None);
        };

        let last_query = manifest
            .history
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::User)
            .map(|turn| turn.content.clone())
            .unwrap_or_default();

        let mut state = GraphState::new(session_id, user_id, last_query);
        state.completed_nodes = manifest.completed_nodes.clone();
        state.current_node = manifest
            .completed_nodes
            .last()
            .cloned()
            .unwrap_or_default();
        state.response_message = manifest.last_response.clone();
        state.response_metadata = manifest.last_metadata.clone();
        Ok(Some(state))
    }
}
