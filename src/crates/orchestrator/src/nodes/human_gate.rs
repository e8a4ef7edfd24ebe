//! Human approval gate
//!
//! Pauses the turn when pending actions require approval and no decision
//! has arrived yet. On resume the decision lands in
//! `response_metadata.human_decision`; the gate records the outcome in
//! `human_approved` for downstream nodes (e.g. `capi_desktop`).

use crate::nodes::complete;
use agentgraph_core::{
    GraphError, GraphNode, GraphState, Interrupt, NodeContext, Result, StateMutator,
    HUMAN_DECISION_KEY,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Human-in-the-loop gate node
#[derive(Debug, Clone, Default)]
pub struct HumanGateNode;

#[async_trait]
impl GraphNode for HumanGateNode {
    fn name(&self) -> &str {
        "human_gate"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let actions = state
            .metadata("actions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let needs_approval = state.metadata_flag("requires_human_approval");
        let decision = state.metadata(HUMAN_DECISION_KEY).cloned();

        if let Some(decision) = decision {
            let approved = decision
                .get("approved")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            debug!(approved, "human decision recorded");

            let mut partial = Map::new();
            partial.insert("human_approved".into(), json!(approved));
            partial.insert("requires_human_approval".into(), json!(false));
            partial.insert("human_decision_resolved".into(), json!(true));
            let s = StateMutator::merge_metadata(&state, partial);
            return Ok(complete(&s, "human_gate"));
        }

        if needs_approval && !actions.is_empty() {
            // No decision yet: pause with the action preview
            return Err(GraphError::Interrupted(Interrupt::approval(
                "human_gate",
                "pending actions require approval",
                json!({"actions": actions}),
            )));
        }

        Ok(complete(&state, "human_gate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_without_actions() {
        let state = GraphState::new("s", "u", "hola");
        let out = HumanGateNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert_eq!(out.completed_nodes.last().unwrap(), "human_gate");
    }

    #[tokio::test]
    async fn test_interrupts_on_pending_actions() {
        let mut state = GraphState::new("s", "u", "q");
        state
            .response_metadata
            .insert("actions".into(), json!([{"type": "cash_transfer"}]));
        state
            .response_metadata
            .insert("requires_human_approval".into(), json!(true));

        let result = HumanGateNode.run(state, &NodeContext::default()).await;
        match result {
            Err(GraphError::Interrupted(interrupt)) => {
                assert_eq!(interrupt.node, "human_gate");
                assert_eq!(
                    interrupt.payload["actions"][0]["type"],
                    json!("cash_transfer")
                );
            }
            other => panic!("expected interrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_decision_resolves_gate() {
        let mut state = GraphState::new("s", "u", "q");
        state
            .response_metadata
            .insert("actions".into(), json!([{"type": "cash_transfer"}]));
        state
            .response_metadata
            .insert("requires_human_approval".into(), json!(true));
        state
            .response_metadata
            .insert(HUMAN_DECISION_KEY.into(), json!({"approved": true}));

        let out = HumanGateNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert!(out.metadata_flag("human_approved"));
        assert!(!out.metadata_flag("requires_human_approval"));
        assert!(out.metadata_flag("human_decision_resolved"));
    }

    #[tokio::test]
    async fn test_declined_decision_records_false() {
        let mut state = GraphState::new("s", "u", "q");
        state
            .response_metadata
            .insert(HUMAN_DECISION_KEY.into(), json!({"approved": false}));

        let out = HumanGateNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert!(!out.metadata_flag("human_approved"));
        assert!(out.metadata_flag("human_decision_resolved"));
    }
}
