//! Runtime configuration from environment variables
//!
//! Canonical variable names:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `CHECKPOINT_BACKEND` | `sqlite` | `sqlite` or `memory` |
//! | `CHECKPOINT_PATH` | `data/checkpoints.db` | SQLite database file |
//! | `WORKSPACE_ROOT` | `.` | Root for `data/sessions/...` |
//! | `INTERRUPT_BEFORE_NODES` | empty | Comma list of nodes to pause before |
//! | `NODE_TIMEOUT_MS` | `60000` | Per-node budget |
//! | `TURN_TIMEOUT_MS` | `180000` | Whole-turn deadline |
//! | `MAX_FANOUT_TARGETS` | `4` | Parallel fan-out cap |
//! | `HUMAN_GATE_TTL_MS` | `300000` | Interrupt auto-decline TTL |
//! | `ENABLE_DYNAMIC_GRAPH` | `true` | Registry-driven graph rebuilds |

use crate::error::Result;
use agentgraph_core::ExecutionLimits;
use std::path::PathBuf;
use std::time::Duration;
use tooling::config::env::{get_env_bool, get_env_or, get_env_parse_or};

/// Which checkpoint backend to instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Typed runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Checkpoint backend selector
    pub checkpoint_backend: CheckpointBackend,
    /// SQLite checkpoint database path
    pub checkpoint_path: PathBuf,
    /// Root directory for session data and agent exports
    pub workspace_root: PathBuf,
    /// Nodes to statically pause before
    pub interrupt_before_nodes: Vec<String>,
    /// Per-node execution budget
    pub node_timeout: Duration,
    /// Whole-turn deadline
    pub turn_timeout: Duration,
    /// Parallel fan-out cap
    pub max_fanout_targets: usize,
    /// Pending interrupts older than this are auto-declined on resume
    pub human_gate_ttl: Duration,
    /// Whether registry changes trigger graph rebuilds
    pub enable_dynamic_graph: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            checkpoint_backend: CheckpointBackend::Sqlite,
            checkpoint_path: PathBuf::from("data/checkpoints.db"),
            workspace_root: PathBuf::from("."),
            interrupt_before_nodes: Vec::new(),
            node_timeout: Duration::from_millis(60_000),
            turn_timeout: Duration::from_millis(180_000),
            max_fanout_targets: 4,
            human_gate_ttl: Duration::from_millis(300_000),
            enable_dynamic_graph: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let backend = match get_env_or("CHECKPOINT_BACKEND", "sqlite")?.to_lowercase().as_str() {
            "memory" => CheckpointBackend::Memory,
            _ => CheckpointBackend::Sqlite,
        };

        let interrupt_before_nodes = get_env_or("INTERRUPT_BEFORE_NODES", "")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            checkpoint_backend: backend,
            checkpoint_path: PathBuf::from(get_env_or(
                "CHECKPOINT_PATH",
                "data/checkpoints.db",
            )?),
            workspace_root: PathBuf::from(get_env_or("WORKSPACE_ROOT", ".")?),
            interrupt_before_nodes,
            node_timeout: Duration::from_millis(get_env_parse_or("NODE_TIMEOUT_MS", 60_000u64)?),
            turn_timeout: Duration::from_millis(get_env_parse_or("TURN_TIMEOUT_MS", 180_000u64)?),
            max_fanout_targets: get_env_parse_or("MAX_FANOUT_TARGETS", 4usize)?,
            human_gate_ttl: Duration::from_millis(get_env_parse_or(
                "HUMAN_GATE_TTL_MS",
                300_000u64,
            )?),
            enable_dynamic_graph: get_env_bool("ENABLE_DYNAMIC_GRAPH")?.unwrap_or(true),
        })
    }

    /// Interpreter limits derived from this configuration
    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            node_timeout: self.node_timeout,
            turn_timeout: self.turn_timeout,
            max_fanout: self.max_fanout_targets,
            ..ExecutionLimits::default()
        }
    }
}
