//! Compiled graph and the step-by-step interpreter
//!
//! [`CompiledGraph`] is the executable form of a topology. One call to
//! [`stream`](CompiledGraph::stream) drives a single turn: the state enters
//! at the entry node and follows direct and conditional edges until a
//! terminal node, an interrupt, a timeout, or cancellation.
//!
//! # Scheduling model
//!
//! Within a session the turn is a single cooperative task: nodes execute
//! sequentially in edge order. A conditional resolver returning multiple
//! targets fans out: each target node runs concurrently on a clone of the
//! state, results are merged deterministically, and execution continues at
//! the convergence node (`assemble`). Different sessions execute fully in
//! parallel; per-session exclusivity is enforced by the caller.
//!
//! # Checkpointing
//!
//! When a checkpoint saver is attached, a snapshot is persisted after every
//! state merge. Write failures are logged and execution continues -
//! checkpoint loss is recoverable. [`resume`](CompiledGraph::resume) loads
//! the latest snapshot for the session, injects the human decision into
//! `response_metadata.human_decision`, and continues from the interrupted
//! node.
//!
//! # Fault policy
//!
//! Node faults never escape the stream. Timeouts and failures are folded
//! into the state's error list, the node is marked completed, and routing
//! falls through to `assemble` so the turn always reaches `finalize`.

use crate::command::Command;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, EdgeResolution, Graph, END, MERGE_NODE};
use crate::interrupt::{Interrupt, InterruptConfig};
use crate::mutator::StateMutator;
use crate::node::{CancellationToken, GraphNode, NodeContext};
use crate::state::{GraphState, WorkflowStatus};
use crate::stream::{EventStream, ExecutionEvent};
use agentgraph_checkpoint::{Checkpoint, CheckpointSaver};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tooling::async_utils::timeout::{with_timeout, TimeoutError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Metadata key holding the pending interrupt while a session awaits resume
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// Metadata key the resumed node reads its decision from
pub const HUMAN_DECISION_KEY: &str = "human_decision";

/// Metadata key recording when the pending interrupt was raised (RFC 3339)
pub const INTERRUPTED_AT_KEY: &str = "interrupted_at";

/// Execution budgets for one turn
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Per-node timeout
    pub node_timeout: Duration,
    /// Whole-turn deadline
    pub turn_timeout: Duration,
    /// Maximum parallel fan-out targets; excess targets are dropped
    pub max_fanout: usize,
    /// Hard cap on interpreter steps, guards against topology bugs
    pub max_steps: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(60),
            turn_timeout: Duration::from_secs(180),
            max_fanout: 4,
            max_steps: 64,
        }
    }
}

/// Per-turn execution configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Session the turn belongs to; keys checkpoints and events
    pub session_id: String,
    /// Cooperative cancellation signal for the turn
    pub cancellation: CancellationToken,
}

impl ExecutionConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Share an externally held cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// An executable graph topology
#[derive(Clone)]
pub struct CompiledGraph {
    graph: Graph,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    interrupts: InterruptConfig,
    limits: ExecutionLimits,
}

impl CompiledGraph {
    pub(crate) fn new(
        graph: Graph,
        checkpointer: Option<Arc<dyn CheckpointSaver>>,
        interrupts: InterruptConfig,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            graph,
            checkpointer,
            interrupts,
            limits,
        }
    }

    /// Sorted node names of the compiled topology
    pub fn node_names(&self) -> Vec<String> {
        self.graph.node_names()
    }

    /// Number of edges in the compiled topology
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Execute one turn, yielding ordered execution events
    ///
    /// The stream ends after the terminal node's events or after an
    /// [`ExecutionEvent::Interrupted`].
    pub fn stream(&self, input: GraphState, config: ExecutionConfig) -> EventStream {
        let entry = self
            .graph
            .entry
            .clone()
            .unwrap_or_else(|| "start".to_string());
        self.spawn_runner(input, entry, false, config)
    }

    /// Resume a paused turn from its latest checkpoint
    ///
    /// The command's resume value lands in
    /// `response_metadata.human_decision`; execution continues at the node
    /// recorded in the checkpoint. Fails with `CheckpointError::NotFound`
    /// (wrapped) when the session has no checkpoint - callers fall back to
    /// manifest-based reconstruction.
    pub async fn resume(&self, command: Command, config: ExecutionConfig) -> Result<EventStream> {
        let saver = self.checkpointer.as_ref().ok_or_else(|| {
            GraphError::InvalidGraph("resume requires a checkpoint saver".to_string())
        })?;

        let (_, checkpoint) = saver
            .latest(&config.session_id)
            .await?
            .ok_or_else(|| {
                GraphError::Checkpoint(agentgraph_checkpoint::CheckpointError::NotFound(
                    config.session_id.clone(),
                ))
            })?;
        checkpoint.check_version()?;

        let mut state: GraphState = serde_json::from_value(checkpoint.snapshot)?;
        let resume_node = if state.current_node.is_empty() {
            self.graph
                .entry
                .clone()
                .unwrap_or_else(|| "start".to_string())
        } else {
            state.current_node.clone()
        };

        if let Some(decision) = command.resume {
            state
                .response_metadata
                .insert(HUMAN_DECISION_KEY.to_string(), decision);
        }
        state.response_metadata.remove(INTERRUPT_KEY);
        state.status = WorkflowStatus::Processing;

        Ok(self.spawn_runner(state, resume_node, true, config))
    }

    /// Drive a stream to completion and return the last merged state
    ///
    /// Convenience for callers that do not care about intermediate events.
    pub async fn run_to_completion(
        &self,
        input: GraphState,
        config: ExecutionConfig,
    ) -> Option<GraphState> {
        use futures::StreamExt;

        let mut stream = self.stream(input, config);
        let mut last = None;
        while let Some(event) = stream.next().await {
            match event {
                ExecutionEvent::StateMerged { state } => last = Some(state),
                ExecutionEvent::Interrupted { state, .. } => return Some(state),
                _ => {}
            }
        }
        last
    }

    fn spawn_runner(
        &self,
        state: GraphState,
        start_node: String,
        resumed: bool,
        config: ExecutionConfig,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(100);
        let runner = Runner {
            graph: self.graph.clone(),
            checkpointer: self.checkpointer.clone(),
            interrupts: self.interrupts.clone(),
            limits: self.limits.clone(),
            config,
            tx,
        };
        tokio::spawn(runner.run(state, start_node, resumed));
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Owns one turn's execution; dropped when the turn ends
struct Runner {
    graph: Graph,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    interrupts: InterruptConfig,
    limits: ExecutionLimits,
    config: ExecutionConfig,
    tx: mpsc::Sender<ExecutionEvent>,
}

impl Runner {
    async fn run(self, mut state: GraphState, start_node: String, resumed: bool) {
        let turn_started = Instant::now();
        let ctx = NodeContext::new(self.config.cancellation.clone(), self.limits.node_timeout);
        let mut current = start_node;
        // The resumed node already passed its static interrupt check
        let mut skip_static_interrupt = resumed;
        let mut step: usize = 0;

        loop {
            step += 1;
            if step > self.limits.max_steps {
                warn!(session_id = %self.config.session_id, step, "step budget exhausted, forcing finalize");
                state = StateMutator::add_error(
                    &state,
                    "step_budget_exhausted",
                    "interpreter step budget exhausted",
                    &current,
                    Map::new(),
                );
                if current == "finalize" {
                    break;
                }
                current = "finalize".to_string();
                continue;
            }

            // Cancellation and the turn deadline are honored at node
            // boundaries only; the turn still drains through finalize.
            if self.config.cancellation.is_cancelled() && current != "finalize" {
                state = StateMutator::add_error(
                    &state,
                    "cancelled",
                    "execution cancelled by external signal",
                    &current,
                    Map::new(),
                );
                state.status = WorkflowStatus::Failed;
                current = "finalize".to_string();
            } else if turn_started.elapsed() > self.limits.turn_timeout && current != "finalize" {
                state = StateMutator::add_error(
                    &state,
                    "turn_timeout",
                    &format!(
                        "turn exceeded deadline of {}ms",
                        self.limits.turn_timeout.as_millis()
                    ),
                    &current,
                    Map::new(),
                );
                state.status = WorkflowStatus::Failed;
                current = "finalize".to_string();
            }

            if !skip_static_interrupt && self.interrupts.should_interrupt_before(&current) {
                let interrupt = Interrupt {
                    node: current.clone(),
                    reason: "interrupt_before".to_string(),
                    payload: Value::Null,
                    requires_human_approval: true,
                };
                self.pause(&mut state, &current, interrupt, step).await;
                return;
            }
            skip_static_interrupt = false;

            let node = match self.graph.node(&current) {
                Some(node) => node.clone(),
                None => {
                    // Unknown routing target: recover through the merge node
                    warn!(node = %current, "routing to unknown node, falling back to assemble");
                    if current == MERGE_NODE {
                        break;
                    }
                    state = StateMutator::add_error(
                        &state,
                        "unknown_node",
                        &format!("node {} is not part of the graph", current),
                        &current,
                        Map::new(),
                    );
                    current = MERGE_NODE.to_string();
                    continue;
                }
            };

            let mut route_override: Option<String> = None;
            match self.execute_node(&node, &state, &ctx, step).await {
                NodeOutcome::Completed(new_state) => {
                    state = new_state;
                }
                NodeOutcome::Paused(interrupt) => {
                    self.pause(&mut state, &current, interrupt, step).await;
                    return;
                }
                NodeOutcome::Faulted(faulted_state) => {
                    state = faulted_state;
                    route_override = Some(MERGE_NODE.to_string());
                }
            }

            state = StateMutator::append_completed_node(&state, &current);
            self.persist_checkpoint(&state, step).await;
            let _ = self
                .tx
                .send(ExecutionEvent::StateMerged {
                    state: state.clone(),
                })
                .await;

            let next = match route_override {
                Some(target) if target != current => Some(EdgeResolution::Single(target)),
                // A fault inside the merge node itself continues on its
                // normal edge so the turn still reaches finalize
                _ => self.resolve_next(&current, &state),
            };

            match next {
                None => break,
                Some(EdgeResolution::Single(target)) if target == END => break,
                Some(EdgeResolution::Single(target)) => {
                    current = target;
                }
                Some(EdgeResolution::Fanout(targets)) => {
                    state = self.run_fanout(&state, targets, &ctx, step).await;
                    self.persist_checkpoint(&state, step).await;
                    let _ = self
                        .tx
                        .send(ExecutionEvent::StateMerged {
                            state: state.clone(),
                        })
                        .await;
                    current = MERGE_NODE.to_string();
                }
            }
        }

        debug!(
            session_id = %self.config.session_id,
            trace_id = %state.trace_id,
            completed = ?state.completed_nodes,
            "turn finished"
        );
    }

    /// Run one node under its timeout; faults become state updates
    async fn execute_node(
        &self,
        node: &Arc<dyn GraphNode>,
        state: &GraphState,
        ctx: &NodeContext,
        step: usize,
    ) -> NodeOutcome {
        let name = node.name().to_string();
        let is_agent = node.is_agent_node();

        let _ = self
            .tx
            .send(ExecutionEvent::NodeStart {
                node: name.clone(),
                is_agent,
            })
            .await;

        let mut entered = StateMutator::enter_node(state, &name);
        let started = Instant::now();

        let result = with_timeout(self.limits.node_timeout, node.run(entered.clone(), ctx)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(new_state) => NodeOutcome::Completed(new_state),
            Err(TimeoutError::Inner(GraphError::Interrupted(interrupt))) => {
                debug!(node = %name, step, "node raised interrupt");
                return NodeOutcome::Paused(interrupt);
            }
            Err(TimeoutError::Inner(error)) => {
                warn!(node = %name, error = %error, "node failed");
                entered = StateMutator::add_error(
                    &entered,
                    error.code(),
                    &error.to_string(),
                    &name,
                    Map::new(),
                );
                NodeOutcome::Faulted(entered)
            }
            Err(TimeoutError::Elapsed(budget)) => {
                warn!(node = %name, timeout_ms = budget.as_millis() as u64, "node timed out");
                entered = StateMutator::add_error(
                    &entered,
                    "node_timeout",
                    &format!("node {} timed out after {}ms", name, budget.as_millis()),
                    &name,
                    Map::new(),
                );
                NodeOutcome::Faulted(entered)
            }
        };

        if let NodeOutcome::Completed(s) | NodeOutcome::Faulted(s) = &outcome {
            let _ = self
                .tx
                .send(ExecutionEvent::NodeUpdate {
                    node: name,
                    is_agent,
                    state: s.clone(),
                    elapsed_ms,
                })
                .await;
        }

        outcome
    }

    /// Execute fan-out targets concurrently and merge their results
    ///
    /// Each target node runs on a clone of the state; branch faults fold
    /// into the merged error list. Execution continues at the merge node.
    async fn run_fanout(
        &self,
        state: &GraphState,
        targets: Vec<String>,
        ctx: &NodeContext,
        step: usize,
    ) -> GraphState {
        let mut targets = targets;
        if targets.len() > self.limits.max_fanout {
            warn!(
                dropped = targets.len() - self.limits.max_fanout,
                "fan-out exceeds limit, dropping excess targets"
            );
            targets.truncate(self.limits.max_fanout);
        }

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(node) = self.graph.node(&target).cloned() else {
                warn!(node = %target, "fan-out target missing, skipping");
                continue;
            };
            let tx = self.tx.clone();
            let branch_state = state.clone();
            let branch_ctx = ctx.clone();
            let node_timeout = self.limits.node_timeout;

            handles.push(tokio::spawn(async move {
                let name = node.name().to_string();
                let is_agent = node.is_agent_node();
                let _ = tx
                    .send(ExecutionEvent::NodeStart {
                        node: name.clone(),
                        is_agent,
                    })
                    .await;

                let entered = StateMutator::enter_node(&branch_state, &name);
                let started = Instant::now();
                let result =
                    with_timeout(node_timeout, node.run(entered.clone(), &branch_ctx)).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let branch_result = match result {
                    Ok(new_state) => new_state,
                    Err(TimeoutError::Inner(error)) => StateMutator::add_error(
                        &entered,
                        error.code(),
                        &error.to_string(),
                        &name,
                        Map::new(),
                    ),
                    Err(TimeoutError::Elapsed(_)) => StateMutator::add_error(
                        &entered,
                        "node_timeout",
                        &format!("node {} timed out in fan-out", name),
                        &name,
                        Map::new(),
                    ),
                };
                let branch_result = StateMutator::append_completed_node(&branch_result, &name);
                let _ = tx
                    .send(ExecutionEvent::NodeUpdate {
                        node: name,
                        is_agent,
                        state: branch_result.clone(),
                        elapsed_ms,
                    })
                    .await;
                branch_result
            }));
        }

        let mut branches = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(branch) => branches.push(branch),
                Err(join_error) => {
                    warn!(error = %join_error, step, "fan-out branch panicked");
                }
            }
        }

        state.clone().merge_parallel(branches)
    }

    /// Persist the pre-interrupt state and emit the final stream event
    async fn pause(&self, state: &mut GraphState, node: &str, interrupt: Interrupt, step: usize) {
        *state = StateMutator::update(state, |s| {
            s.status = WorkflowStatus::AwaitingHuman;
            s.current_node = node.to_string();
            s.response_metadata.insert(
                INTERRUPT_KEY.to_string(),
                serde_json::to_value(&interrupt).unwrap_or(Value::Null),
            );
            s.response_metadata.insert(
                INTERRUPTED_AT_KEY.to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        });
        self.persist_checkpoint(state, step).await;
        let _ = self
            .tx
            .send(ExecutionEvent::Interrupted {
                interrupt,
                state: state.clone(),
            })
            .await;
    }

    /// Resolve the successor(s) of a node from its outgoing edge
    ///
    /// Conditional results are validated against the path map: unknown
    /// single targets fall back to the merge node, unknown fan-out members
    /// are dropped, and an empty fan-out collapses to the merge node.
    fn resolve_next(&self, current: &str, state: &GraphState) -> Option<EdgeResolution> {
        match self.graph.edges.get(current) {
            None => None,
            Some(Edge::Direct(to)) => Some(EdgeResolution::Single(to.clone())),
            Some(Edge::Conditional { resolver, path_map }) => {
                match resolver(state) {
                    EdgeResolution::Single(target) => {
                        if target == END || path_map.contains_key(&target) {
                            Some(EdgeResolution::Single(target))
                        } else {
                            debug!(from = %current, target = %target, "resolver returned unmapped target, falling back to assemble");
                            Some(EdgeResolution::Single(MERGE_NODE.to_string()))
                        }
                    }
                    EdgeResolution::Fanout(targets) => {
                        let valid: Vec<String> = targets
                            .into_iter()
                            .filter(|t| path_map.contains_key(t))
                            .collect();
                        match valid.len() {
                            0 => Some(EdgeResolution::Single(MERGE_NODE.to_string())),
                            1 => Some(EdgeResolution::Single(
                                valid.into_iter().next().unwrap_or_default(),
                            )),
                            _ => Some(EdgeResolution::Fanout(valid)),
                        }
                    }
                }
            }
        }
    }

    /// Best-effort checkpoint write; loss is recoverable
    async fn persist_checkpoint(&self, state: &GraphState, step: usize) {
        let Some(saver) = &self.checkpointer else {
            return;
        };
        let snapshot = match serde_json::to_value(state) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "state snapshot serialization failed, skipping checkpoint");
                return;
            }
        };
        let checkpoint_id = format!("cp-{:04}-{}", step, &Uuid::new_v4().to_string()[..8]);
        let checkpoint = Checkpoint::new(self.config.session_id.clone(), checkpoint_id, snapshot)
            .with_extra("step", json!(step))
            .with_extra("node", json!(state.current_node));

        if let Err(error) = saver.put(checkpoint).await {
            warn!(
                session_id = %self.config.session_id,
                error = %error,
                "checkpoint write failed, continuing"
            );
        }
    }
}

/// Internal result of running one node
enum NodeOutcome {
    Completed(GraphState),
    Paused(Interrupt),
    Faulted(GraphState),
}
