//! Graph construction API
//!
//! [`GraphBuilder`] assembles nodes and edges, validates the topology, and
//! compiles it into an executable [`CompiledGraph`]. Checkpointing and
//! static interrupts attach at compile time.
//!
//! ```rust,ignore
//! let mut builder = GraphBuilder::new();
//! builder
//!     .add_node(Arc::new(StartNode::default()))
//!     .add_node(Arc::new(AssembleNode::default()))
//!     .add_edge("start", "assemble")
//!     .add_edge("assemble", END);
//!
//! let compiled = builder
//!     .with_checkpointer(saver)
//!     .with_interrupts(InterruptConfig::before(["human_gate"]))
//!     .compile()?;
//! ```

use crate::compiled::{CompiledGraph, ExecutionLimits};
use crate::error::{GraphError, Result};
use crate::graph::{EdgeResolver, Graph, NodeId};
use crate::interrupt::InterruptConfig;
use crate::node::GraphNode;
use agentgraph_checkpoint::CheckpointSaver;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for executable graphs
#[derive(Default)]
pub struct GraphBuilder {
    graph: Graph,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    interrupts: InterruptConfig,
    limits: ExecutionLimits,
}

impl GraphBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; the first node added becomes the entry point
    pub fn add_node(&mut self, node: Arc<dyn GraphNode>) -> &mut Self {
        self.graph.add_node(node);
        self
    }

    /// Add a direct edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from, to);
        self
    }

    /// Add a conditional edge with its path map
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<NodeId>,
        resolver: EdgeResolver,
        path_map: HashMap<String, NodeId>,
    ) -> &mut Self {
        self.graph.add_conditional_edge(from, resolver, path_map);
        self
    }

    /// Override the entry point
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.entry = Some(node.into());
        self
    }

    /// Attach a checkpoint saver; a checkpoint is persisted after every merge
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    /// Attach static interrupt configuration
    pub fn with_interrupts(mut self, interrupts: InterruptConfig) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Override execution limits (timeouts, fan-out cap)
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate and compile into an executable graph
    pub fn compile(self) -> Result<CompiledGraph> {
        self.graph.validate().map_err(GraphError::InvalidGraph)?;
        Ok(CompiledGraph::new(
            self.graph,
            self.checkpointer,
            self.interrupts,
            self.limits,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::END;
    use crate::node::NodeContext;
    use crate::state::GraphState;
    use async_trait::async_trait;

    struct PassNode(&'static str);

    #[async_trait]
    impl GraphNode for PassNode {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
            Ok(state)
        }
    }

    #[test]
    fn test_compile_validates() {
        let mut builder = GraphBuilder::new();
        builder.add_node(Arc::new(PassNode("start")));
        builder.add_edge("start", "missing");
        assert!(matches!(
            builder.compile(),
            Err(GraphError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_compile_linear_graph() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(Arc::new(PassNode("start")))
            .add_node(Arc::new(PassNode("finalize")))
            .add_edge("start", "finalize")
            .add_edge("finalize", END);
        assert!(builder.compile().is_ok());
    }
}
