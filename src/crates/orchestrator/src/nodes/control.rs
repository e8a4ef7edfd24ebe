//! Start and finalize nodes

use crate::nodes::complete;
use agentgraph_core::{
    GraphNode, GraphState, NodeContext, Result, StateMutator, WorkflowStatus,
};
use async_trait::async_trait;
use tracing::debug;

/// User-facing fallback when no agent produced a reply
pub const FALLBACK_RESPONSE: &str =
    "Lo siento, no pude generar una respuesta en este momento.";

/// Marks the turn as processing and seeds the metrics
#[derive(Debug, Clone, Default)]
pub struct StartNode;

#[async_trait]
impl GraphNode for StartNode {
    fn name(&self) -> &str {
        "start"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        debug!(session_id = %state.session_id, trace_id = %state.trace_id, "turn started");
        let s = StateMutator::set_status(&state, WorkflowStatus::Processing);
        let s = StateMutator::record_metric(&s, "loop_count", 0.0);
        Ok(complete(&s, "start"))
    }
}

/// Closes the turn: terminal status and a guaranteed non-empty reply
#[derive(Debug, Clone, Default)]
pub struct FinalizeNode;

#[async_trait]
impl GraphNode for FinalizeNode {
    fn name(&self) -> &str {
        "finalize"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let mut s = state;
        if s.response_message.trim().is_empty() {
            s = StateMutator::update(&s, |s| {
                s.response_message = FALLBACK_RESPONSE.to_string();
            });
        }
        if s.status != WorkflowStatus::Failed {
            s = StateMutator::set_status(&s, WorkflowStatus::Completed);
        }
        Ok(complete(&s, "finalize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_marks_processing() {
        let state = GraphState::new("s", "u", "hola");
        let out = StartNode.run(state, &NodeContext::default()).await.unwrap();

        assert_eq!(out.status, WorkflowStatus::Processing);
        assert_eq!(out.completed_nodes, vec!["start"]);
        assert_eq!(out.processing_metrics.get("loop_count"), Some(&0.0));
    }

    #[tokio::test]
    async fn test_finalize_fills_empty_message() {
        let state = GraphState::new("s", "u", "hola");
        let out = FinalizeNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(out.response_message, FALLBACK_RESPONSE);
        assert_eq!(out.status, WorkflowStatus::Completed);
        assert_eq!(out.completed_nodes.last().unwrap(), "finalize");
    }

    #[tokio::test]
    async fn test_finalize_keeps_existing_message_and_failure() {
        let mut state = GraphState::new("s", "u", "hola");
        state.response_message = "listo".into();
        state.status = WorkflowStatus::Failed;

        let out = FinalizeNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(out.response_message, "listo");
        assert_eq!(out.status, WorkflowStatus::Failed);
    }
}
