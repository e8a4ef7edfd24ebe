//! Orchestration runtime
//!
//! [`GraphRuntime`] is the programmatic entry point: it owns the registry,
//! the event gateway, the checkpoint saver, the session manifest store, and
//! the dynamically rebuilt graph, and exposes the `process_query` /
//! `resume_human_gate` surface the API layer consumes.
//!
//! # Per-session serialization
//!
//! At most one execution is in flight per `session_id`; a second
//! `process_query` while one is active is rejected with
//! [`OrchestratorError::SessionBusy`]. Different sessions run fully in
//! parallel.
//!
//! # Liveness
//!
//! If the compiled stream yields no node updates and no interrupt is
//! pending, the runtime falls back to a hard-coded linear chain driven
//! directly through the nodes, so a turn always produces an envelope.

use crate::config::{CheckpointBackend, RuntimeConfig};
use crate::envelope::{ResponseEnvelope, ResponseType};
use crate::error::{OrchestratorError, Result};
use crate::events::{node_action, ProgressEvent};
use crate::gateway::EventGateway;
use crate::graph::{DynamicGraphBuilder, GraphStatus};
use crate::intent::HeuristicIntentService;
use crate::nodes::{
    AssembleNode, FinalizeNode, HumanGateNode, IntentNode, LoopControllerNode, ReActNode,
    ReasoningNode, RouterNode, StartNode, SupervisorNode,
};
use crate::registry::AgentRegistry;
use crate::session::{ManifestTurn, SessionManifestStore};
use crate::workspace::Workspace;
use agentgraph_checkpoint::{CheckpointSaver, MemoryCheckpointSaver, SqliteCheckpointSaver};
use agentgraph_core::{
    CancellationToken, Command, EventStream, ExecutionConfig, ExecutionEvent, GraphNode,
    GraphState, Interrupt, InterruptConfig, NodeContext, RoutingDecision, StateMutator,
    WorkflowMode, HUMAN_DECISION_KEY, INTERRUPTED_AT_KEY,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tooling::logging::PhaseTimer;
use tracing::{debug, info, warn};

/// Outcome of pumping one execution stream
struct TurnOutcome {
    final_state: Option<GraphState>,
    interrupted: Option<Interrupt>,
    updates: usize,
}

/// RAII slot enforcing at-most-one execution per session
struct SessionSlot {
    sessions: Arc<Mutex<HashMap<String, CancellationToken>>>,
    session_id: String,
    token: CancellationToken,
}

impl SessionSlot {
    fn acquire(
        sessions: &Arc<Mutex<HashMap<String, CancellationToken>>>,
        session_id: &str,
    ) -> Result<Self> {
        let token = CancellationToken::new();
        let mut guard = sessions.lock();
        if guard.contains_key(session_id) {
            return Err(OrchestratorError::SessionBusy(session_id.to_string()));
        }
        guard.insert(session_id.to_string(), token.clone());
        Ok(Self {
            sessions: sessions.clone(),
            session_id: session_id.to_string(),
            token,
        })
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.session_id);
    }
}

/// The multi-agent orchestration runtime
pub struct GraphRuntime {
    config: RuntimeConfig,
    registry: Arc<AgentRegistry>,
    gateway: Arc<EventGateway>,
    manifest_store: Arc<SessionManifestStore>,
    checkpointer: Arc<dyn CheckpointSaver>,
    graphs: DynamicGraphBuilder,
    active_sessions: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl GraphRuntime {
    /// Production wiring: components instantiated from the configuration
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let workspace = Workspace::new(config.workspace_root.clone());
        let registry = Arc::new(AgentRegistry::with_builtin_agents(workspace.clone()));
        let gateway = Arc::new(EventGateway::new());
        Self::with_components(config, registry, gateway).await
    }

    /// Explicit-dependency wiring, used by tests and embedders
    pub async fn with_components(
        config: RuntimeConfig,
        registry: Arc<AgentRegistry>,
        gateway: Arc<EventGateway>,
    ) -> Result<Self> {
        let workspace = Workspace::new(config.workspace_root.clone());
        let manifest_store = Arc::new(SessionManifestStore::new(workspace.clone()));

        let checkpointer: Arc<dyn CheckpointSaver> = match config.checkpoint_backend {
            CheckpointBackend::Memory => Arc::new(MemoryCheckpointSaver::new()),
            CheckpointBackend::Sqlite => {
                let path = if config.checkpoint_path.is_absolute() {
                    config.checkpoint_path.clone()
                } else {
                    config.workspace_root.join(&config.checkpoint_path)
                };
                Arc::new(SqliteCheckpointSaver::open(path).await?)
            }
        };

        let interrupts = InterruptConfig::before(config.interrupt_before_nodes.clone());
        let graphs = DynamicGraphBuilder::new(
            registry.clone(),
            Arc::new(HeuristicIntentService::new()),
            checkpointer.clone(),
            interrupts,
            config.execution_limits(),
        )?;

        Ok(Self {
            config,
            registry,
            gateway,
            manifest_store,
            checkpointer,
            graphs,
            active_sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn gateway(&self) -> Arc<EventGateway> {
        self.gateway.clone()
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        self.registry.clone()
    }

    /// Process one user turn end to end
    pub async fn process_query(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<ResponseEnvelope> {
        let slot = SessionSlot::acquire(&self.active_sessions, session_id)?;
        let timer = PhaseTimer::start("process_query");
        info!(session_id, user_id, "process_query start");

        let mut state = Self::initial_state(session_id, user_id, text);
        self.hydrate_history(&mut state).await;
        let trace_id = state.trace_id.clone();

        let graph = self.graphs.current();
        let exec_config =
            ExecutionConfig::new(session_id).with_cancellation(slot.token.clone());
        let stream = graph.stream(state.clone(), exec_config);
        let outcome = self.pump(stream, session_id, &trace_id).await;

        let mut final_state = outcome.final_state.clone().unwrap_or_else(|| state.clone());
        if outcome.updates == 0 && outcome.interrupted.is_none() {
            // Stream produced nothing: hard-coded linear fallback
            warn!(session_id, "graph stream yielded no updates, running manual fallback");
            final_state = self.manual_fallback(state).await;
            self.gateway.emit(
                session_id,
                &ProgressEvent::state_snapshot(
                    session_id,
                    &trace_id,
                    Self::snapshot_summary(&final_state),
                ),
            );
        }

        if let Err(error) = self.manifest_store.update_from_state(&final_state).await {
            warn!(session_id, error = %error, "manifest update failed");
        }

        info!(
            session_id,
            trace_id = %final_state.trace_id,
            status = ?final_state.status,
            completed = final_state.completed_nodes.len(),
            errors = final_state.errors.len(),
            "process_query end"
        );
        let mut envelope = Self::map_envelope(&final_state, outcome.interrupted.as_ref(), false);
        envelope
            .meta
            .insert("elapsed_ms".into(), json!(timer.elapsed_ms()));
        Ok(envelope)
    }

    /// Resume a turn paused at a human gate
    ///
    /// Expired interrupts (older than the configured TTL) are auto-declined
    /// and the envelope reports `human_timeout`.
    pub async fn resume_human_gate(
        &self,
        session_id: &str,
        decision: Value,
    ) -> Result<ResponseEnvelope> {
        let slot = SessionSlot::acquire(&self.active_sessions, session_id)?;
        let timer = PhaseTimer::start("resume_human_gate");
        info!(session_id, "resume_human_gate start");

        let (decision, human_timeout) = self.apply_interrupt_ttl(session_id, decision).await;

        let graph = self.graphs.current();
        let exec_config =
            ExecutionConfig::new(session_id).with_cancellation(slot.token.clone());

        let final_result = match graph
            .resume(Command::resume(decision.clone()), exec_config)
            .await
        {
            Ok(stream) => {
                let trace_id = self
                    .checkpointer
                    .latest(session_id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|(_, cp)| {
                        cp.snapshot
                            .get("trace_id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_default();
                let outcome = self.pump(stream, session_id, &trace_id).await;
                outcome
                    .final_state
                    .map(|state| (state, outcome.interrupted))
            }
            Err(error) => {
                // Checkpoint read failed: reconstruct from the manifest
                warn!(session_id, error = %error, "checkpoint resume failed, rebuilding from manifest");
                self.manual_resume(session_id, &decision).await?
            }
        };

        let Some((final_state, interrupted)) = final_result else {
            return Err(OrchestratorError::Manifest(format!(
                "no resumable state for session {}",
                session_id
            )));
        };

        if let Err(error) = self.manifest_store.update_from_state(&final_state).await {
            warn!(session_id, error = %error, "manifest update failed");
        }

        let mut envelope = Self::map_envelope(&final_state, interrupted.as_ref(), human_timeout);
        envelope
            .meta
            .insert("elapsed_ms".into(), json!(timer.elapsed_ms()));
        Ok(envelope)
    }

    /// Conversation history recorded in the session manifest
    pub async fn get_session_history(&self, session_id: &str) -> Result<Vec<ManifestTurn>> {
        Ok(self
            .manifest_store
            .get_manifest(session_id)
            .await?
            .map(|m| m.history)
            .unwrap_or_default())
    }

    /// Sessions with recorded state
    pub async fn list_active_sessions(&self) -> Result<Vec<String>> {
        self.manifest_store.list_sessions().await
    }

    /// Drop a session's manifest and checkpoints
    pub async fn clear_session_history(&self, session_id: &str) -> Result<()> {
        self.manifest_store.clear(session_id).await?;
        self.checkpointer.delete_session(session_id).await?;
        Ok(())
    }

    /// Signal cooperative cancellation of an in-flight turn
    pub fn cancel_session(&self, session_id: &str) -> bool {
        match self.active_sessions.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Enable (or register) an agent and rebuild the graph
    pub fn register_agent(&self, name: &str) -> std::result::Result<(), String> {
        if !self.config.enable_dynamic_graph {
            return Err("dynamic graph rebuilds are disabled".to_string());
        }
        self.graphs.register_agent(name)
    }

    /// Disable an agent and rebuild the graph
    pub fn unregister_agent(&self, name: &str) -> std::result::Result<(), String> {
        if !self.config.enable_dynamic_graph {
            return Err("dynamic graph rebuilds are disabled".to_string());
        }
        self.graphs.unregister_agent(name)
    }

    /// Force a graph rebuild over the current registry
    pub fn refresh_graph(&self) -> std::result::Result<(), String> {
        self.graphs.rebuild().map_err(|e| e.to_string())
    }

    /// Introspection snapshot of the live graph
    pub fn graph_status(&self) -> GraphStatus {
        self.graphs.status()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Build the initial state; JSON input populates the external payload
    fn initial_state(session_id: &str, user_id: &str, text: &str) -> GraphState {
        let mut payload = Map::new();
        let mut query_text = text.to_string();
        let mut mode = WorkflowMode::Chat;

        if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(text) {
            query_text = parsed
                .get("query")
                .or_else(|| parsed.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if let Some(m) = parsed
                .get("workflow_mode")
                .or_else(|| parsed.get("mode"))
                .and_then(Value::as_str)
            {
                if m == "alert_monitor" {
                    mode = WorkflowMode::AlertMonitor;
                }
            }
            payload = parsed;
        }

        GraphState::new(session_id, user_id, query_text)
            .with_workflow_mode(mode)
            .with_external_payload(payload)
    }

    /// Load prior turns from the manifest into the state's context windows
    async fn hydrate_history(&self, state: &mut GraphState) {
        let manifest = match self.manifest_store.get_manifest(&state.session_id).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return,
            Err(error) => {
                warn!(session_id = %state.session_id, error = %error, "history load failed");
                return;
            }
        };

        state.conversation_history = manifest
            .history
            .iter()
            .rev()
            .take(10)
            .rev()
            .map(|turn| agentgraph_core::ConversationTurn {
                role: turn.role,
                content: turn.content.clone(),
                created_at: turn.created_at,
            })
            .collect();
        state.memory_window = state
            .conversation_history
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|turn| json!({"role": turn.role, "content": turn.content}))
            .collect();
    }

    /// Drive a stream, mirroring events into the gateway
    async fn pump(&self, mut stream: EventStream, session_id: &str, trace_id: &str) -> TurnOutcome {
        let mut outcome = TurnOutcome {
            final_state: None,
            interrupted: None,
            updates: 0,
        };
        let mut last_node: Option<String> = None;

        while let Some(event) = stream.next().await {
            match event {
                ExecutionEvent::NodeStart { node, is_agent } => {
                    if let Some(from) = &last_node {
                        if from != &node {
                            self.gateway.emit(
                                session_id,
                                &ProgressEvent::node_transition(
                                    session_id,
                                    trace_id,
                                    from,
                                    &node,
                                    node_action(&node),
                                ),
                            );
                        }
                    }
                    if is_agent {
                        self.gateway.emit(
                            session_id,
                            &ProgressEvent::agent_start(session_id, trace_id, &node),
                        );
                    }
                }
                ExecutionEvent::NodeUpdate {
                    node,
                    is_agent,
                    state,
                    elapsed_ms,
                } => {
                    if is_agent {
                        let success = !state.errors.iter().any(|e| e.node == node);
                        self.gateway.emit(
                            session_id,
                            &ProgressEvent::agent_end(
                                session_id, trace_id, &node, success, elapsed_ms,
                            ),
                        );
                    }
                    last_node = Some(node);
                    outcome.updates += 1;
                }
                ExecutionEvent::StateMerged { state } => {
                    self.gateway.emit(
                        session_id,
                        &ProgressEvent::state_snapshot(
                            session_id,
                            trace_id,
                            Self::snapshot_summary(&state),
                        ),
                    );
                    outcome.final_state = Some(state);
                }
                ExecutionEvent::Interrupted { interrupt, state } => {
                    debug!(node = %interrupt.node, "turn interrupted");
                    self.gateway.emit(
                        session_id,
                        &ProgressEvent::state_snapshot(
                            session_id,
                            trace_id,
                            Self::snapshot_summary(&state),
                        ),
                    );
                    outcome.interrupted = Some(interrupt);
                    outcome.final_state = Some(state);
                }
            }
        }

        outcome
    }

    /// Compact state view for snapshot frames
    fn snapshot_summary(state: &GraphState) -> Value {
        json!({
            "status": state.status,
            "current_node": state.current_node,
            "completed_nodes": state.completed_nodes,
            "detected_intent": state.detected_intent,
            "active_agent": state.active_agent,
            "error_count": state.errors.len(),
        })
    }

    /// Hard-coded linear chain guaranteeing liveness
    async fn manual_fallback(&self, seed: GraphState) -> GraphState {
        let ctx = NodeContext::default();
        let intent_service = Arc::new(HeuristicIntentService::new());
        let chain: Vec<Arc<dyn GraphNode>> = vec![
            Arc::new(StartNode),
            Arc::new(IntentNode::new(intent_service)),
            Arc::new(ReActNode),
            Arc::new(ReasoningNode::new(self.registry.clone())),
            Arc::new(SupervisorNode::new(self.registry.clone())),
            Arc::new(RouterNode::new(self.registry.clone())),
        ];

        let mut state = seed;
        for node in chain {
            state = Self::run_fallback_node(node.as_ref(), state, &ctx).await;
        }

        let decision = match &state.routing_decision {
            Some(RoutingDecision::Single(target)) if target != "assemble" => target.clone(),
            _ => state
                .active_agent
                .clone()
                .unwrap_or_else(|| "capi_gus".to_string()),
        };
        let decision = if decision == "human_gate" {
            "capi_gus".to_string()
        } else {
            decision
        };

        if let Some(agent) = self.registry.instantiate(&decision) {
            state = Self::run_fallback_node(agent.as_ref(), state, &ctx).await;
        } else {
            debug!(agent = %decision, "fallback agent unavailable, skipping");
        }

        for node in [
            Arc::new(HumanGateNode) as Arc<dyn GraphNode>,
            Arc::new(AssembleNode),
            Arc::new(FinalizeNode),
        ] {
            state = Self::run_fallback_node(node.as_ref(), state, &ctx).await;
        }
        state
    }

    /// Run one node in the fallback chain; faults fold into the state
    async fn run_fallback_node(
        node: &dyn GraphNode,
        state: GraphState,
        ctx: &NodeContext,
    ) -> GraphState {
        match node.run(state.clone(), ctx).await {
            Ok(next) => next,
            Err(error) => {
                warn!(node = node.name(), error = %error, "fallback node failed");
                let s = StateMutator::add_error(
                    &state,
                    error.code(),
                    &error.to_string(),
                    node.name(),
                    Map::new(),
                );
                StateMutator::append_completed_node(&s, node.name())
            }
        }
    }

    /// Auto-decline decisions for interrupts older than the TTL
    async fn apply_interrupt_ttl(&self, session_id: &str, decision: Value) -> (Value, bool) {
        let interrupted_at: Option<DateTime<Utc>> = self
            .checkpointer
            .latest(session_id)
            .await
            .ok()
            .flatten()
            .and_then(|(_, cp)| {
                cp.snapshot
                    .get("response_metadata")
                    .and_then(|m| m.get(INTERRUPTED_AT_KEY))
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
            });

        if let Some(at) = interrupted_at {
            let age = Utc::now().signed_duration_since(at);
            if age.to_std().unwrap_or_default() > self.config.human_gate_ttl {
                warn!(session_id, age_secs = age.num_seconds(), "interrupt expired, auto-declining");
                return (
                    json!({"approved": false, "reason": "human_timeout"}),
                    true,
                );
            }
        }
        (decision, false)
    }

    /// Manifest-based resume when checkpoints are unreadable
    async fn manual_resume(
        &self,
        session_id: &str,
        decision: &Value,
    ) -> Result<Option<(GraphState, Option<Interrupt>)>> {
        let Some(state) = self
            .manifest_store
            .rebuild_state(session_id, "unknown")
            .await?
        else {
            return Ok(None);
        };

        let ctx = NodeContext::default();
        let mut state = StateMutator::update(&state, |s| {
            s.response_metadata
                .insert(HUMAN_DECISION_KEY.to_string(), decision.clone());
        });
        for node in [
            Arc::new(HumanGateNode) as Arc<dyn GraphNode>,
            Arc::new(AssembleNode),
            Arc::new(FinalizeNode),
        ] {
            state = Self::run_fallback_node(node.as_ref(), state, &ctx).await;
        }
        Ok(Some((state, None)))
    }

    /// Map the final state onto the caller-facing envelope
    fn map_envelope(
        state: &GraphState,
        interrupted: Option<&Interrupt>,
        human_timeout: bool,
    ) -> ResponseEnvelope {
        let mut meta = Map::new();
        meta.insert("completed_nodes".into(), json!(state.completed_nodes));
        meta.insert("intent_confidence".into(), json!(state.intent_confidence));
        if let Some(agent) = &state.active_agent {
            meta.insert("active_agent".into(), json!(agent));
        }
        if human_timeout {
            meta.insert("human_timeout".into(), json!(true));
        }

        let empty_input = state.original_query.trim().is_empty() && state.external_payload.is_empty();

        let (response_type, message) = if let Some(interrupt) = interrupted {
            meta.insert("requires_human".into(), json!(true));
            meta.insert("interrupt".into(), serde_json::to_value(interrupt).unwrap_or(Value::Null));
            let message = if state.response_message.is_empty() {
                format!(
                    "Se requiere aprobaci\u{f3}n humana: {}.",
                    interrupt.reason
                )
            } else {
                state.response_message.clone()
            };
            (ResponseType::Notice, message)
        } else if empty_input {
            (
                ResponseType::Error,
                "No recib\u{ed} ninguna consulta. Escrib\u{ed} qu\u{e9} necesit\u{e1}s y lo vemos."
                    .to_string(),
            )
        } else if state.status == agentgraph_core::WorkflowStatus::Failed
            || !state.errors.is_empty()
        {
            let message = if state.response_message.is_empty() {
                crate::nodes::control::FALLBACK_RESPONSE.to_string()
            } else {
                state.response_message.clone()
            };
            (ResponseType::Error, message)
        } else if state.metadata_flag("supervisor_replanned") || state.metadata_flag("desktop_denied")
        {
            (ResponseType::Notice, state.response_message.clone())
        } else {
            (ResponseType::Success, state.response_message.clone())
        };

        ResponseEnvelope {
            trace_id: state.trace_id.clone(),
            response_type,
            intent: state.detected_intent,
            message,
            data: state.response_data.clone(),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_from_plain_text() {
        let state = GraphRuntime::initial_state("s", "u", "hola");
        assert_eq!(state.original_query, "hola");
        assert_eq!(state.workflow_mode, WorkflowMode::Chat);
        assert!(state.external_payload.is_empty());
    }

    #[test]
    fn test_initial_state_from_json_payload() {
        let state = GraphRuntime::initial_state(
            "s",
            "u",
            r#"{"query": "saldo", "workflow_mode": "alert_monitor", "operation": "select"}"#,
        );
        assert_eq!(state.original_query, "saldo");
        assert_eq!(state.workflow_mode, WorkflowMode::AlertMonitor);
        assert_eq!(
            state.external_payload.get("operation"),
            Some(&json!("select"))
        );
    }

    #[test]
    fn test_envelope_for_empty_query_is_error() {
        let mut state = GraphState::new("s", "u", "   ");
        state.response_message = "algo".into();
        let envelope = GraphRuntime::map_envelope(&state, None, false);
        assert_eq!(envelope.response_type, ResponseType::Error);
        assert!(!envelope.message.is_empty());
    }

    #[test]
    fn test_envelope_for_interrupt_requires_human() {
        let state = GraphState::new("s", "u", "update tabla");
        let interrupt = Interrupt::approval("capi_datab", "needs approval", json!({}));
        let envelope = GraphRuntime::map_envelope(&state, Some(&interrupt), false);

        assert_eq!(envelope.response_type, ResponseType::Notice);
        assert!(envelope.requires_human());
        assert!(envelope.message.contains("aprobaci\u{f3}n"));
    }

    #[test]
    fn test_envelope_success_carries_message_and_data() {
        let mut state = GraphState::new("s", "u", "hola");
        state.response_message = "¡Hola!".into();
        state.response_data.insert("x".into(), json!(1));

        let envelope = GraphRuntime::map_envelope(&state, None, false);
        assert_eq!(envelope.response_type, ResponseType::Success);
        assert_eq!(envelope.data["x"], json!(1));
        assert_eq!(envelope.trace_id, state.trace_id);
    }
}
