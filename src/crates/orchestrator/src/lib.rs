//! # orchestrator - Multi-agent financial assistant runtime
//!
//! The orchestration layer of capi-agentes: natural-language queries enter
//! through [`GraphRuntime::process_query`], flow through the conversation
//! graph (intent classification, planning, supervision, routing, the
//! specialist agents, human gate, assembly), and come back as a
//! [`ResponseEnvelope`] while subscribed clients receive the ordered
//! progress stream over WebSocket.
//!
//! ## Components
//!
//! - [`runtime::GraphRuntime`] - entry points (`process_query`,
//!   `resume_human_gate`, session admin, dynamic registry operations)
//! - [`registry::AgentRegistry`] - agent manifests, enablement, factories
//! - [`graph`] - the standard topology and its dynamic rebuild lifecycle
//! - [`nodes`] - orchestration and agent nodes
//! - [`gateway::EventGateway`] - per-session ordered event fan-out
//! - [`session::SessionManifestStore`] - per-session manifest files
//! - [`config::RuntimeConfig`] - environment-driven configuration
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use orchestrator::{config::RuntimeConfig, runtime::GraphRuntime};
//!
//! let runtime = GraphRuntime::new(RuntimeConfig::from_env()?).await?;
//! let envelope = runtime.process_query("session-1", "user-1", "hola").await?;
//! assert!(!envelope.message.is_empty());
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod gateway;
pub mod graph;
pub mod intent;
pub mod nodes;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod workspace;

pub use config::{CheckpointBackend, RuntimeConfig};
pub use envelope::{ResponseEnvelope, ResponseType};
pub use error::{OrchestratorError, Result};
pub use events::{ProgressEvent, ProgressEventType};
pub use gateway::{EventGateway, Subscriber};
pub use graph::{DynamicGraphBuilder, GraphStatus};
pub use registry::{AgentManifest, AgentRegistry, NodeFactory};
pub use runtime::GraphRuntime;
pub use session::{ManifestTurn, SessionManifest, SessionManifestStore};
pub use workspace::Workspace;
