//! Summary specialist
//!
//! Condenses whatever the turn has gathered so far (artifacts, history,
//! reasoning narrative) into a short report.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Summarization agent
#[derive(Debug, Clone, Default)]
pub struct SummaryNode;

#[async_trait]
impl GraphNode for SummaryNode {
    fn name(&self) -> &str {
        "summary"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let mut lines: Vec<String> = Vec::new();

        for (agent, bucket) in &state.shared_artifacts {
            if let Some(summary) = bucket.get("summary").and_then(Value::as_str) {
                lines.push(format!("{}: {}", agent, summary));
            }
        }
        if lines.is_empty() && !state.conversation_history.is_empty() {
            lines.push(format!(
                "La conversaci\u{f3}n lleva {} turno(s).",
                state.conversation_history.len()
            ));
        }
        if lines.is_empty() {
            lines.push(format!(
                "Consulta \"{}\" sin datos previos que resumir.",
                state.original_query
            ));
        }

        let report = lines.join(" ");

        let mut bucket = Map::new();
        bucket.insert("summary".into(), json!(report));
        bucket.insert("sources".into(), json!(state.shared_artifacts.len()));
        let mut s = StateMutator::merge_shared_artifact(&state, "summary", bucket);
        s = StateMutator::update(&s, |s| {
            if s.response_message.is_empty() {
                s.response_message = report;
            }
            s.active_agent = Some("summary".into());
        });
        Ok(complete(&s, "summary"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_summarizes_artifact_buckets() {
        let mut state = GraphState::new("s", "u", "resumen");
        let mut bucket = Map::new();
        bucket.insert("summary".into(), json!("Sucursal 23 al dia."));
        state.shared_artifacts.insert("branch".into(), bucket);

        let out = SummaryNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert!(out.response_message.contains("Sucursal 23"));
        assert_eq!(
            out.artifacts_of("summary").unwrap()["sources"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn test_empty_turn_still_produces_report() {
        let state = GraphState::new("s", "u", "resumen de todo");
        let out = SummaryNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();
        assert!(out.response_message.contains("resumen de todo"));
    }
}
