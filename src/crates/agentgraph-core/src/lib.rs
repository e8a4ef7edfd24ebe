//! # agentgraph-core - Graph orchestration engine for capi-agentes
//!
//! A directed-graph state machine for driving multi-agent conversation
//! turns: typed state threaded through named nodes, conditional routing with
//! parallel fan-out, durable checkpoints, and cooperative human-in-the-loop
//! interrupts.
//!
//! ## Core concepts
//!
//! - [`GraphState`] - the single conversation-scoped record every node
//!   consumes and returns; updates are value-semantic via [`StateMutator`]
//! - [`GraphNode`] - the processing-unit contract (`run(state) -> state`)
//! - [`GraphBuilder`] / [`CompiledGraph`] - topology construction and the
//!   step-by-step interpreter
//! - [`ExecutionEvent`] - the ordered per-turn event stream (`updates` and
//!   `values` interleaved)
//! - [`Interrupt`] / [`Command`] - cooperative pause and external resume
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use agentgraph_core::{ExecutionConfig, GraphBuilder, GraphState};
//! use futures::StreamExt;
//!
//! let mut builder = GraphBuilder::new();
//! builder.add_node(start_node).add_node(assemble_node);
//! builder.add_edge("start", "assemble");
//! builder.add_edge("assemble", agentgraph_core::END);
//!
//! let compiled = builder.with_checkpointer(saver).compile()?;
//! let mut stream = compiled.stream(
//!     GraphState::new("session-1", "user-1", "hola"),
//!     ExecutionConfig::new("session-1"),
//! );
//! while let Some(event) = stream.next().await {
//!     // updates and values, in execution order
//! }
//! ```
//!
//! ## Execution model
//!
//! One turn is a single cooperative task; nodes execute sequentially in edge
//! order. Conditional resolvers may return multiple targets, which spawn
//! concurrent sibling tasks over state clones; their outputs merge with
//! deterministic rules at the `assemble` convergence node. Node faults and
//! timeouts fold into the state's error list and route to `assemble`, so a
//! turn always drains through `finalize`.

pub mod builder;
pub mod command;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod mutator;
pub mod node;
pub mod plan;
pub mod state;
pub mod stream;

pub use builder::GraphBuilder;
pub use command::Command;
pub use compiled::{
    CompiledGraph, ExecutionConfig, ExecutionLimits, HUMAN_DECISION_KEY, INTERRUPTED_AT_KEY,
    INTERRUPT_KEY,
};
pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeResolution, EdgeResolver, Graph, NodeId, END, MERGE_NODE};
pub use interrupt::{Interrupt, InterruptConfig};
pub use mutator::StateMutator;
pub use node::{CancellationToken, GraphNode, NodeContext};
pub use plan::{Complexity, ReasoningPlan, ReasoningStep};
pub use state::{
    merge_map_one_level, ConversationTurn, ErrorRecord, GraphState, Intent, RoutingDecision,
    TurnRole, WorkflowMode, WorkflowStatus,
};
pub use stream::{EventStream, ExecutionEvent, StreamMode};
