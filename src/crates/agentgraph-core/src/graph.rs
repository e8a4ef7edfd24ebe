//! Core graph data structures
//!
//! A [`Graph`] is a set of named nodes connected by direct and conditional
//! edges. Conditional edges carry a resolver closure plus a `path_map`
//! declaring every target the resolver may legally return; resolver results
//! outside the map fall back to the merge node (`assemble`) rather than
//! failing the turn.

use crate::node::GraphNode;
use crate::state::GraphState;
use std::collections::HashMap;
use std::sync::Arc;

/// Node identifier within a graph
pub type NodeId = String;

/// Name of the virtual end marker; execution stops when an edge targets it
pub const END: &str = "__end__";

/// Name of the convergence node for fan-out and fallback routing
pub const MERGE_NODE: &str = "assemble";

/// Outcome of a conditional edge resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeResolution {
    /// Route to a single node
    Single(NodeId),
    /// Execute multiple nodes in parallel; results converge at `assemble`
    Fanout(Vec<NodeId>),
}

impl From<&str> for EdgeResolution {
    fn from(target: &str) -> Self {
        EdgeResolution::Single(target.to_string())
    }
}

impl From<String> for EdgeResolution {
    fn from(target: String) -> Self {
        EdgeResolution::Single(target)
    }
}

impl From<Vec<String>> for EdgeResolution {
    fn from(targets: Vec<String>) -> Self {
        EdgeResolution::Fanout(targets)
    }
}

/// Router function deciding the successor(s) of a conditional edge
pub type EdgeResolver = Arc<dyn Fn(&GraphState) -> EdgeResolution + Send + Sync>;

/// A graph arc
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge to a specific node
    Direct(NodeId),

    /// Conditional edge with dynamic routing
    Conditional {
        /// Decides the next node(s) from the current state
        resolver: EdgeResolver,
        /// All targets the resolver may return; unknown results fall back
        /// to [`MERGE_NODE`]
        path_map: HashMap<String, NodeId>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { path_map, .. } => f
                .debug_struct("Conditional")
                .field("resolver", &"<function>")
                .field("path_map", path_map)
                .finish(),
        }
    }
}

/// Directed graph of nodes and edges
#[derive(Clone, Default)]
pub struct Graph {
    /// All nodes mapped by their unique names
    pub nodes: HashMap<NodeId, Arc<dyn GraphNode>>,

    /// Outgoing edge per source node
    ///
    /// A node has at most one outgoing edge; conditional edges express
    /// branching through their resolver.
    pub edges: HashMap<NodeId, Edge>,

    /// Entry point node name
    pub entry: Option<NodeId>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; the first node added becomes the entry point
    pub fn add_node(&mut self, node: Arc<dyn GraphNode>) {
        let name = node.name().to_string();
        if self.entry.is_none() {
            self.entry = Some(name.clone());
        }
        self.nodes.insert(name, node);
    }

    /// Add a direct (unconditional) edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
    }

    /// Add a conditional edge with a resolver and its path map
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<NodeId>,
        resolver: EdgeResolver,
        path_map: HashMap<String, NodeId>,
    ) {
        self.edges
            .insert(from.into(), Edge::Conditional { resolver, path_map });
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<&Arc<dyn GraphNode>> {
        self.nodes.get(name)
    }

    /// Sorted node names (for status reporting)
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Validate the graph structure
    ///
    /// - an entry point exists
    /// - every edge source and target exists (targets may be [`END`])
    /// - every conditional path-map target exists (or is [`END`])
    /// - the merge node exists when any conditional edge is present
    pub fn validate(&self) -> Result<(), String> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| "graph has no entry point".to_string())?;
        if !self.nodes.contains_key(entry) {
            return Err(format!("entry point {} does not exist", entry));
        }

        let mut has_conditional = false;
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(format!("edge source {} does not exist", from));
            }
            match edge {
                Edge::Direct(to) => {
                    if to != END && !self.nodes.contains_key(to) {
                        return Err(format!("edge target {} does not exist", to));
                    }
                }
                Edge::Conditional { path_map, .. } => {
                    has_conditional = true;
                    for to in path_map.values() {
                        if to != END && !self.nodes.contains_key(to) {
                            return Err(format!("branch target {} does not exist", to));
                        }
                    }
                }
            }
        }

        if has_conditional && !self.nodes.contains_key(MERGE_NODE) {
            return Err(format!(
                "conditional edges require the {} merge node",
                MERGE_NODE
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as GraphResult;
    use crate::node::NodeContext;
    use async_trait::async_trait;

    struct PassNode {
        name: String,
    }

    #[async_trait]
    impl GraphNode for PassNode {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, state: GraphState, _ctx: &NodeContext) -> GraphResult<GraphState> {
            Ok(state)
        }
    }

    fn pass(name: &str) -> Arc<dyn GraphNode> {
        Arc::new(PassNode {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_first_node_becomes_entry() {
        let mut graph = Graph::new();
        graph.add_node(pass("start"));
        graph.add_node(pass("assemble"));
        assert_eq!(graph.entry.as_deref(), Some("start"));
    }

    #[test]
    fn test_validate_accepts_linear_graph() {
        let mut graph = Graph::new();
        graph.add_node(pass("start"));
        graph.add_node(pass("finalize"));
        graph.add_edge("start", "finalize");
        graph.add_edge("finalize", END);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_target() {
        let mut graph = Graph::new();
        graph.add_node(pass("start"));
        graph.add_edge("start", "missing");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_requires_merge_node_with_conditionals() {
        let mut graph = Graph::new();
        graph.add_node(pass("start"));
        graph.add_node(pass("a"));
        let path_map = HashMap::from([("a".to_string(), "a".to_string())]);
        graph.add_conditional_edge("start", Arc::new(|_s: &GraphState| "a".into()), path_map);

        assert!(graph.validate().is_err());

        graph.add_node(pass(MERGE_NODE));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_edge_resolution_conversions() {
        let single: EdgeResolution = "assemble".into();
        assert_eq!(single, EdgeResolution::Single("assemble".to_string()));

        let fanout: EdgeResolution = vec!["branch".to_string(), "anomaly".to_string()].into();
        assert_eq!(
            fanout,
            EdgeResolution::Fanout(vec!["branch".to_string(), "anomaly".to_string()])
        );
    }
}
