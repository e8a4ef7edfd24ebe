//! Final routing node
//!
//! Resolves the definitive `routing_decision` the conditional edge after
//! this node reads. Precedence:
//!
//! 1. explicit `routing_decision` whose targets are enabled
//! 2. `response_metadata.parallel_targets` (fan-out)
//! 3. `response_metadata.recommended_agent`
//! 4. `active_agent`
//! 5. `assemble`

use crate::nodes::complete;
use crate::registry::AgentRegistry;
use agentgraph_core::{
    GraphNode, GraphState, NodeContext, Result, RoutingDecision, StateMutator,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Routing resolution node
pub struct RouterNode {
    registry: Arc<AgentRegistry>,
}

impl RouterNode {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    fn enabled(&self, agent: &str) -> bool {
        agent == "assemble" || self.registry.is_enabled(agent)
    }

    fn resolve(&self, state: &GraphState) -> RoutingDecision {
        // 1. Explicit upstream decision with enabled targets
        if let Some(decision) = &state.routing_decision {
            match decision {
                RoutingDecision::Single(target) if self.enabled(target) => {
                    return decision.clone();
                }
                RoutingDecision::Fanout(targets) => {
                    let valid: Vec<String> = targets
                        .iter()
                        .filter(|t| self.enabled(t))
                        .cloned()
                        .collect();
                    if !valid.is_empty() {
                        return if valid.len() == 1 {
                            RoutingDecision::Single(valid.into_iter().next().unwrap_or_default())
                        } else {
                            RoutingDecision::Fanout(valid)
                        };
                    }
                }
                _ => {}
            }
        }

        // 2. Parallel fan-out hint
        if let Some(Value::Array(targets)) = state.metadata("parallel_targets") {
            let valid: Vec<String> = targets
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| self.enabled(t))
                .map(str::to_string)
                .collect();
            if valid.len() > 1 {
                return RoutingDecision::Fanout(valid);
            }
            if let Some(single) = valid.into_iter().next() {
                return RoutingDecision::Single(single);
            }
        }

        // 3. Planner recommendation
        if let Some(agent) = state
            .metadata("recommended_agent")
            .and_then(Value::as_str)
        {
            if self.enabled(agent) {
                return RoutingDecision::Single(agent.to_string());
            }
        }

        // 4. Previously active agent
        if let Some(agent) = &state.active_agent {
            if self.enabled(agent) {
                return RoutingDecision::Single(agent.clone());
            }
        }

        // 5. Fallback
        RoutingDecision::Single("assemble".to_string())
    }
}

#[async_trait]
impl GraphNode for RouterNode {
    fn name(&self) -> &str {
        "router"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let decision = self.resolve(&state);
        debug!(decision = ?decision, "routing resolved");

        let s = StateMutator::update(&state, |s| {
            if let RoutingDecision::Single(target) = &decision {
                if target != "assemble" {
                    s.active_agent = Some(target.clone());
                }
            }
            s.routing_decision = Some(decision);
        });
        Ok(complete(&s, "router"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<AgentRegistry>, RouterNode) {
        let registry = Arc::new(AgentRegistry::with_builtin_agents(Workspace::new(
            dir.path(),
        )));
        (registry.clone(), RouterNode::new(registry))
    }

    #[tokio::test]
    async fn test_explicit_decision_wins() {
        let dir = TempDir::new().unwrap();
        let (_r, node) = setup(&dir);

        let mut state = GraphState::new("s", "u", "q");
        state.routing_decision = Some(RoutingDecision::Single("anomaly".into()));
        state
            .response_metadata
            .insert("recommended_agent".into(), json!("capi_gus"));

        let out = node.run(state, &NodeContext::default()).await.unwrap();
        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("anomaly".into()))
        );
        assert_eq!(out.active_agent.as_deref(), Some("anomaly"));
    }

    #[tokio::test]
    async fn test_parallel_targets_fan_out() {
        let dir = TempDir::new().unwrap();
        let (_r, node) = setup(&dir);

        let mut state = GraphState::new("s", "u", "q");
        state
            .response_metadata
            .insert("parallel_targets".into(), json!(["branch", "anomaly"]));

        let out = node.run(state, &NodeContext::default()).await.unwrap();
        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Fanout(vec![
                "branch".into(),
                "anomaly".into()
            ]))
        );
    }

    #[tokio::test]
    async fn test_disabled_recommendation_falls_back() {
        let dir = TempDir::new().unwrap();
        let (registry, node) = setup(&dir);
        registry.set_enabled("capi_desktop", false).unwrap();

        let mut state = GraphState::new("s", "u", "q");
        state.routing_decision = Some(RoutingDecision::Single("capi_desktop".into()));
        state
            .response_metadata
            .insert("recommended_agent".into(), json!("capi_desktop"));
        state.active_agent = Some("capi_gus".into());

        let out = node.run(state, &NodeContext::default()).await.unwrap();
        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("capi_gus".into()))
        );
    }

    #[tokio::test]
    async fn test_everything_disabled_routes_to_assemble() {
        let dir = TempDir::new().unwrap();
        let (registry, node) = setup(&dir);
        for manifest in registry.list_registered_agents() {
            registry.set_enabled(&manifest.agent_name, false).unwrap();
        }

        let mut state = GraphState::new("s", "u", "q");
        state
            .response_metadata
            .insert("recommended_agent".into(), json!("capi_gus"));

        let out = node.run(state, &NodeContext::default()).await.unwrap();
        assert_eq!(
            out.routing_decision,
            Some(RoutingDecision::Single("assemble".into()))
        );
        assert!(out.active_agent.is_none());
    }
}
