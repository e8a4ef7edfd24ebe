//! Streaming execution events
//!
//! The interpreter yields an ordered stream of [`ExecutionEvent`]s per turn.
//! Two stream modes interleave, mirroring the `("updates", ...)` /
//! `("values", ...)` convention of the runtime's push protocol:
//!
//! - [`StreamMode::Updates`] events describe node-level progress
//!   (`NodeStart`, `NodeUpdate`, `Interrupted`)
//! - [`StreamMode::Values`] events carry the full merged state
//!   (`StateMerged`)
//!
//! Ordering guarantees: events arrive in the order the interpreter produced
//! them; the `NodeStart` of a node precedes any event of that node; the
//! `StateMerged` of step *N* precedes any event of step *N+1*.

use crate::interrupt::Interrupt;
use crate::state::GraphState;
use futures::stream::Stream;
use std::pin::Pin;

/// Which family an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Node-level progress events
    Updates,
    /// Full-state snapshots after each merge
    Values,
}

/// One event from a graph execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// A node is about to execute
    NodeStart {
        node: String,
        is_agent: bool,
    },

    /// A node completed; carries the node's output state
    NodeUpdate {
        node: String,
        is_agent: bool,
        state: GraphState,
        elapsed_ms: u64,
    },

    /// The merged state after a step
    StateMerged { state: GraphState },

    /// Execution paused awaiting external resume; final event of the stream
    Interrupted {
        interrupt: Interrupt,
        state: GraphState,
    },
}

impl ExecutionEvent {
    /// The stream mode this event belongs to
    pub fn mode(&self) -> StreamMode {
        match self {
            ExecutionEvent::StateMerged { .. } => StreamMode::Values,
            _ => StreamMode::Updates,
        }
    }

    /// Node name, where the event is node-scoped
    pub fn node(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStart { node, .. } | ExecutionEvent::NodeUpdate { node, .. } => {
                Some(node)
            }
            ExecutionEvent::Interrupted { interrupt, .. } => Some(&interrupt.node),
            ExecutionEvent::StateMerged { .. } => None,
        }
    }
}

/// Ordered stream of execution events for one turn
pub type EventStream = Pin<Box<dyn Stream<Item = ExecutionEvent> + Send>>;
