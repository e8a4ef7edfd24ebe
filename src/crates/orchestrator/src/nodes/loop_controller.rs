//! Retry loop guard
//!
//! Decides whether the turn loops back through the router (retry with an
//! alternative agent) or proceeds to assemble. The loop counter in
//! `processing_metrics.loop_count` bounds the cycle.

use crate::nodes::complete;
use agentgraph_core::{
    GraphNode, GraphState, NodeContext, Result, RoutingDecision, StateMutator,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Maximum trips through the router per turn
pub const MAX_LOOPS: f64 = 2.0;

/// Bounded-retry controller
#[derive(Debug, Clone, Default)]
pub struct LoopControllerNode;

#[async_trait]
impl GraphNode for LoopControllerNode {
    fn name(&self) -> &str {
        "loop_controller"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let loop_count = state
            .processing_metrics
            .get("loop_count")
            .copied()
            .unwrap_or(0.0);

        let s = if loop_count >= MAX_LOOPS {
            warn!(loop_count, "loop budget exhausted, proceeding to assemble");
            StateMutator::update(&state, |s| {
                s.routing_decision = Some(RoutingDecision::Single("assemble".into()));
            })
        } else {
            let decision = state
                .routing_decision
                .clone()
                .unwrap_or(RoutingDecision::Single("assemble".into()));
            debug!(loop_count, decision = ?decision, "routing through");
            let s = StateMutator::record_metric(&state, "loop_count", loop_count + 1.0);
            StateMutator::update(&s, |s| s.routing_decision = Some(decision))
        };

        Ok(complete(&s, "loop_controller"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_decision_and_increments_counter() {
        let mut state = GraphState::new("s", "u", "q");
        state.routing_decision = Some(RoutingDecision::Single("capi_datab".into()));
        state.processing_metrics.insert("loop_count".into(), 0.0);

        let out = LoopControllerNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("capi_datab".into()))
        );
        assert_eq!(out.processing_metrics.get("loop_count"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_missing_decision_defaults_to_assemble() {
        let state = GraphState::new("s", "u", "q");
        let out = LoopControllerNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("assemble".into()))
        );
    }

    #[tokio::test]
    async fn test_loop_budget_forces_assemble() {
        let mut state = GraphState::new("s", "u", "q");
        state.routing_decision = Some(RoutingDecision::Single("capi_datab".into()));
        state.processing_metrics.insert("loop_count".into(), 2.0);

        let out = LoopControllerNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("assemble".into()))
        );
    }
}
