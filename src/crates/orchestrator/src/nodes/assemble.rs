//! Response assembly node
//!
//! The convergence point of the graph: merges all artifact buckets and
//! per-node outputs into the final `response_data` and composes a coherent
//! `response_message` when no agent did. Guarantees at least one sentence.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Final merge node
#[derive(Debug, Clone, Default)]
pub struct AssembleNode;

impl AssembleNode {
    /// Compose a message from artifact summaries, deduplicated in order
    fn compose_message(state: &GraphState) -> String {
        let mut fragments: Vec<String> = Vec::new();
        let mut push_unique = |fragment: &str| {
            let fragment = fragment.trim();
            if !fragment.is_empty() && !fragments.iter().any(|f| f == fragment) {
                fragments.push(fragment.to_string());
            }
        };

        for bucket in state.shared_artifacts.values() {
            if let Some(summary) = bucket.get("summary").and_then(Value::as_str) {
                push_unique(summary);
            }
        }
        if let Some(summary) = state.metadata("result_summary").and_then(Value::as_str) {
            push_unique(summary);
        }

        if fragments.is_empty() {
            "No encontr\u{e9} resultados para tu consulta.".to_string()
        } else {
            fragments.join(" ")
        }
    }
}

#[async_trait]
impl GraphNode for AssembleNode {
    fn name(&self) -> &str {
        "assemble"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        // Fold every artifact bucket into the structured payload
        let mut artifacts = Map::new();
        for (agent, bucket) in &state.shared_artifacts {
            artifacts.insert(agent.clone(), Value::Object(bucket.clone()));
        }

        let mut data = Map::new();
        if !artifacts.is_empty() {
            data.insert("artifacts".into(), Value::Object(artifacts));
        }
        if !state.errors.is_empty() {
            data.insert(
                "errors".into(),
                json!(state
                    .errors
                    .iter()
                    .map(|e| json!({"code": e.code, "message": e.message, "node": e.node}))
                    .collect::<Vec<_>>()),
            );
        }

        let mut s = StateMutator::merge_response_data(&state, data);
        if s.response_message.trim().is_empty() {
            let message = Self::compose_message(&s);
            s = StateMutator::update(&s, |s| s.response_message = message);
        }
        Ok(complete(&s, "assemble"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_merges_artifacts_into_response_data() {
        let mut state = GraphState::new("s", "u", "q");
        let mut bucket = Map::new();
        bucket.insert("rows".into(), json!([1, 2]));
        bucket.insert("summary".into(), json!("Dos filas."));
        state.shared_artifacts.insert("capi_datab".into(), bucket);

        let out = AssembleNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert_eq!(
            out.response_data["artifacts"]["capi_datab"]["rows"],
            json!([1, 2])
        );
        assert_eq!(out.response_message, "Dos filas.");
    }

    #[tokio::test]
    async fn test_existing_message_is_kept() {
        let mut state = GraphState::new("s", "u", "q");
        state.response_message = "Respuesta del agente.".into();

        let out = AssembleNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert_eq!(out.response_message, "Respuesta del agente.");
    }

    #[tokio::test]
    async fn test_empty_turn_still_gets_sentence() {
        let state = GraphState::new("s", "u", "q");
        let out = AssembleNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert!(!out.response_message.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_summaries_are_deduplicated() {
        let mut state = GraphState::new("s", "u", "q");
        for agent in ["branch", "anomaly"] {
            let mut bucket = Map::new();
            bucket.insert("summary".into(), json!("Mismo texto."));
            state.shared_artifacts.insert(agent.into(), bucket);
        }

        let out = AssembleNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert_eq!(out.response_message, "Mismo texto.");
    }

    #[tokio::test]
    async fn test_errors_surface_in_response_data() {
        let state = GraphState::new("s", "u", "q");
        let state = StateMutator::add_error(&state, "node_timeout", "boom", "capi_datab", Map::new());

        let out = AssembleNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert_eq!(out.response_data["errors"][0]["code"], json!("node_timeout"));
    }
}
