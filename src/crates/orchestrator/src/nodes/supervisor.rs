//! Plan validation node
//!
//! Checks the reasoning plan against the current enabled-agent set and the
//! accumulated errors. An invalid recommendation triggers a replan onto the
//! fallback agent (version bump recorded in the plan history).

use crate::nodes::complete;
use crate::registry::AgentRegistry;
use agentgraph_core::{
    GraphNode, GraphState, NodeContext, ReasoningPlan, Result, RoutingDecision, StateMutator,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Supervisor over the reasoning plan
pub struct SupervisorNode {
    registry: Arc<AgentRegistry>,
}

impl SupervisorNode {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl GraphNode for SupervisorNode {
    fn name(&self) -> &str {
        "supervisor"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let mut plan: ReasoningPlan = state
            .metadata("reasoning_plan")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let recommended = plan.recommended_agent.clone();
        let fallback = plan
            .fallback_agent
            .clone()
            .unwrap_or_else(|| "capi_gus".to_string());

        // Replan when the recommendation is disabled or already failed
        let recommendation_failed = recommended
            .as_deref()
            .map(|agent| state.errors.iter().any(|e| e.node == agent))
            .unwrap_or(false);
        let recommendation_disabled = recommended
            .as_deref()
            .map(|agent| !self.registry.is_enabled(agent))
            .unwrap_or(true);

        let mut partial = Map::new();
        let s = if recommendation_disabled || recommendation_failed {
            let replacement = if self.registry.is_enabled(&fallback) {
                Some(fallback.clone())
            } else {
                None
            };
            warn!(
                recommended = recommended.as_deref().unwrap_or("-"),
                disabled = recommendation_disabled,
                failed = recommendation_failed,
                replacement = replacement.as_deref().unwrap_or("assemble"),
                "plan rejected, replanning"
            );

            plan.replan();
            plan.recommended_agent = replacement.clone();
            partial.insert("reasoning_plan".into(), serde_json::to_value(&plan)?);
            partial.insert("supervisor_replanned".into(), json!(true));
            if let Some(original) = &recommended {
                partial.insert(
                    "result_summary".into(),
                    json!(format!(
                        "El especialista {} no est\u{e1} disponible en este momento; sigo yo con lo que tengo.",
                        original
                    )),
                );
            }
            // Mask the stale recommendation so the router cannot pick it up
            match &replacement {
                Some(agent) => {
                    partial.insert("recommended_agent".into(), json!(agent));
                }
                None => {
                    partial.insert("recommended_agent".into(), Value::Null);
                }
            }

            let decision = replacement
                .map(RoutingDecision::Single)
                .unwrap_or_else(|| RoutingDecision::Single("assemble".into()));
            let s = StateMutator::merge_metadata(&state, partial);
            StateMutator::update(&s, |s| s.routing_decision = Some(decision))
        } else {
            debug!(
                recommended = recommended.as_deref().unwrap_or("-"),
                "plan validated"
            );
            partial.insert("supervisor_validated".into(), json!(true));
            StateMutator::merge_metadata(&state, partial)
        };

        // Parallel hints pass through untouched for the router
        if let Some(Value::Array(_)) = s.metadata("parallel_targets") {
            debug!("parallel targets present, router will fan out");
        }

        Ok(complete(&s, "supervisor"))
    }
}
