//! Intent classification node

use crate::intent::{SemanticIntentService, SemanticResult};
use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, warn};

/// Classifies the query through a pluggable semantic service
///
/// Fails open: a classifier error leaves the turn alive with
/// `detected_intent = unknown` and confidence 0.
pub struct IntentNode {
    service: Arc<dyn SemanticIntentService>,
}

impl IntentNode {
    pub fn new(service: Arc<dyn SemanticIntentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl GraphNode for IntentNode {
    fn name(&self) -> &str {
        "intent"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let result = match self
            .service
            .classify(&state.original_query, &state.external_payload)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "intent classification failed, falling back to unknown");
                SemanticResult::unknown()
            }
        };

        debug!(
            intent = ?result.intent,
            confidence = result.confidence,
            target = result.target_agent.as_deref().unwrap_or("-"),
            "intent classified"
        );

        let mut semantic = Map::new();
        semantic.insert("intent".into(), serde_json::to_value(result.intent)?);
        semantic.insert("confidence".into(), json!(result.confidence));
        if let Some(target) = &result.target_agent {
            semantic.insert("target_agent".into(), json!(target));
        }

        let s = StateMutator::update(&state, |s| {
            s.detected_intent = result.intent;
            s.intent_confidence = result.confidence;
        });
        let mut partial = Map::new();
        partial.insert("semantic_result".into(), semantic.into());
        let s = StateMutator::merge_metadata(&s, partial);
        Ok(complete(&s, "intent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::HeuristicIntentService;
    use agentgraph_core::Intent;
    use serde_json::Value;

    struct FailingService;

    #[async_trait]
    impl SemanticIntentService for FailingService {
        async fn classify(
            &self,
            _query: &str,
            _payload: &Map<String, Value>,
        ) -> std::result::Result<SemanticResult, String> {
            Err("llm unavailable".to_string())
        }
    }

    #[tokio::test]
    async fn test_classifies_and_records_semantic_result() {
        let node = IntentNode::new(Arc::new(HeuristicIntentService::new()));
        let state = GraphState::new("s", "u", "dame el saldo de la sucursal 23");

        let out = node.run(state, &NodeContext::default()).await.unwrap();

        assert_eq!(out.detected_intent, Intent::BranchQuery);
        assert!(out.intent_confidence > 0.5);
        let semantic = out.metadata("semantic_result").unwrap();
        assert_eq!(semantic["target_agent"], json!("capi_datab"));
        assert_eq!(out.completed_nodes.last().unwrap(), "intent");
    }

    #[tokio::test]
    async fn test_fails_open_to_unknown() {
        let node = IntentNode::new(Arc::new(FailingService));
        let state = GraphState::new("s", "u", "hola");

        let out = node.run(state, &NodeContext::default()).await.unwrap();

        assert_eq!(out.detected_intent, Intent::Unknown);
        assert_eq!(out.intent_confidence, 0.0);
    }
}
