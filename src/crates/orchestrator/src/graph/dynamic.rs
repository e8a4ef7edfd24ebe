//! Dynamic graph lifecycle
//!
//! Holds the currently compiled graph behind an `Arc` swap: rebuilds are
//! atomic, in-flight executions keep the graph they started with, and a
//! failed rebuild leaves the previous graph serving while the error
//! surfaces through [`GraphStatus`].

use crate::graph::build_graph;
use crate::intent::SemanticIntentService;
use crate::registry::AgentRegistry;
use agentgraph_checkpoint::CheckpointSaver;
use agentgraph_core::{CompiledGraph, ExecutionLimits, InterruptConfig, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Introspection snapshot of the live graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphStatus {
    pub nodes: Vec<String>,
    pub edge_count: usize,
    pub enabled_agents: Vec<String>,
    pub version: u64,
    pub built_at: DateTime<Utc>,
    /// Error of the last failed rebuild, if the live graph predates it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rebuild_error: Option<String>,
}

/// Registry-driven graph builder with atomic hot swap
pub struct DynamicGraphBuilder {
    registry: Arc<AgentRegistry>,
    intent_service: Arc<dyn SemanticIntentService>,
    checkpointer: Arc<dyn CheckpointSaver>,
    interrupts: InterruptConfig,
    limits: ExecutionLimits,
    current: RwLock<Arc<CompiledGraph>>,
    status: RwLock<GraphStatus>,
    version: AtomicU64,
}

impl DynamicGraphBuilder {
    /// Build the initial graph; fails only when the topology is invalid
    pub fn new(
        registry: Arc<AgentRegistry>,
        intent_service: Arc<dyn SemanticIntentService>,
        checkpointer: Arc<dyn CheckpointSaver>,
        interrupts: InterruptConfig,
        limits: ExecutionLimits,
    ) -> Result<Self> {
        let compiled = build_graph(
            registry.clone(),
            intent_service.clone(),
            checkpointer.clone(),
            interrupts.clone(),
            limits.clone(),
        )?;
        let status = GraphStatus {
            nodes: compiled.node_names(),
            edge_count: compiled.edge_count(),
            enabled_agents: registry.enabled_agents(),
            version: 1,
            built_at: Utc::now(),
            last_rebuild_error: None,
        };
        Ok(Self {
            registry,
            intent_service,
            checkpointer,
            interrupts,
            limits,
            current: RwLock::new(Arc::new(compiled)),
            status: RwLock::new(status),
            version: AtomicU64::new(1),
        })
    }

    /// The live compiled graph; callers hold the Arc for their whole turn
    pub fn current(&self) -> Arc<CompiledGraph> {
        self.current.read().clone()
    }

    /// Introspection snapshot
    pub fn status(&self) -> GraphStatus {
        self.status.read().clone()
    }

    /// Recompile over the current registry state and swap atomically
    ///
    /// On failure the previous graph keeps serving and the error is
    /// recorded in the status.
    pub fn rebuild(&self) -> Result<()> {
        self.registry.refresh_registry();
        match build_graph(
            self.registry.clone(),
            self.intent_service.clone(),
            self.checkpointer.clone(),
            self.interrupts.clone(),
            self.limits.clone(),
        ) {
            Ok(compiled) => {
                let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
                let new_status = GraphStatus {
                    nodes: compiled.node_names(),
                    edge_count: compiled.edge_count(),
                    enabled_agents: self.registry.enabled_agents(),
                    version,
                    built_at: Utc::now(),
                    last_rebuild_error: None,
                };
                *self.current.write() = Arc::new(compiled);
                *self.status.write() = new_status;
                info!(version, "graph rebuilt");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "graph rebuild failed, keeping previous graph");
                self.status.write().last_rebuild_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Enable (registering if needed) an agent and rebuild
    pub fn register_agent(&self, name: &str) -> std::result::Result<(), String> {
        if self.registry.get_agent_manifest(name).is_some() {
            self.registry.set_enabled(name, true)?;
        } else {
            self.registry.register_builtin(name, true)?;
        }
        self.rebuild().map_err(|e| e.to_string())
    }

    /// Disable an agent and rebuild
    pub fn unregister_agent(&self, name: &str) -> std::result::Result<(), String> {
        self.registry.set_enabled(name, false)?;
        self.rebuild().map_err(|e| e.to_string())
    }
}
