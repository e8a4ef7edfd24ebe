//! Node contract and execution context
//!
//! A [`GraphNode`] consumes a state and returns a new state. Nodes translate
//! their own faults into state updates where possible; the interpreter folds
//! anything that escapes into the error list and routes to `assemble`, so no
//! node fault ever aborts the turn.

use crate::error::Result;
use crate::state::GraphState;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation signal shared by a turn
///
/// Nodes check the token before long operations; the interpreter checks it at
/// every node boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was signalled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-run context handed to every node
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Cooperative cancellation for the turn
    pub cancellation: CancellationToken,
    /// Per-node execution budget
    pub node_timeout: Duration,
}

impl NodeContext {
    pub fn new(cancellation: CancellationToken, node_timeout: Duration) -> Self {
        Self {
            cancellation,
            node_timeout,
        }
    }
}

impl Default for NodeContext {
    fn default() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            node_timeout: Duration::from_secs(60),
        }
    }
}

/// A processing unit of the graph
///
/// Implementations must be cheap to share (`Arc<dyn GraphNode>`); any mutable
/// working data belongs in the state, not the node.
#[async_trait]
pub trait GraphNode: Send + Sync {
    /// Unique node name within the graph
    fn name(&self) -> &str;

    /// Whether this node wraps a specialist agent
    ///
    /// Agent nodes get `agent_start`/`agent_end` events emitted around their
    /// execution.
    fn is_agent_node(&self) -> bool {
        false
    }

    /// Execute node logic, returning a new state
    async fn run(&self, state: GraphState, ctx: &NodeContext) -> Result<GraphState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_default_context_timeout() {
        let ctx = NodeContext::default();
        assert_eq!(ctx.node_timeout, Duration::from_secs(60));
    }
}
