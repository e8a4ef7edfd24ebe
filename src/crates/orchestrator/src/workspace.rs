//! Workspace filesystem layout and atomic writes
//!
//! All durable session artifacts live under the workspace root:
//!
//! ```text
//! <workspace>/data/sessions/session_<sanitized_id>.json     # manifest
//! <workspace>/data/sessions/session_<sid>/<agent>/<file>    # agent exports
//! ```
//!
//! Files are written atomically (temp-file-then-rename) and session ids are
//! sanitized to filesystem-safe tokens before they touch a path.

use crate::error::Result;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reduce a session id to `[A-Za-z0-9_-]`; everything else becomes `_`
pub fn sanitize_session_id(session_id: &str) -> String {
    let sanitized: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Filesystem layout rooted at the workspace directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding session manifests and export subdirectories
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("data").join("sessions")
    }

    /// Manifest file path for a session
    pub fn manifest_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("session_{}.json", sanitize_session_id(session_id)))
    }

    /// Export directory for one agent within a session
    pub fn agent_export_dir(&self, session_id: &str, agent: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("session_{}", sanitize_session_id(session_id)))
            .join(agent)
    }

    /// Export filename embedding a timestamp and a short random token
    pub fn export_filename(prefix: &str, extension: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        format!("{}_{}_{}.{}", prefix, timestamp, token, extension)
    }

    /// Write a file atomically via temp-file-then-rename
    pub async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write an agent export and return its path
    pub async fn write_export(
        &self,
        session_id: &str,
        agent: &str,
        prefix: &str,
        extension: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        let path = self
            .agent_export_dir(session_id, agent)
            .join(Self::export_filename(prefix, extension));
        self.write_atomic(&path, contents).await?;
        Ok(path)
    }
}
