//! Planning node
//!
//! Builds a [`ReasoningPlan`] from the detected intent, the ReAct trace,
//! and the enabled-agent set, then records the recommended specialist for
//! the router.

use crate::nodes::complete;
use crate::registry::AgentRegistry;
use agentgraph_core::{
    GraphNode, GraphState, Intent, NodeContext, ReasoningPlan, Result, RoutingDecision,
    StateMutator, WorkflowMode,
};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::debug;

/// Plan construction node
pub struct ReasoningNode {
    registry: Arc<AgentRegistry>,
}

impl ReasoningNode {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Specialist per intent family
    fn agent_for_intent(intent: Intent) -> &'static str {
        match intent {
            Intent::SummaryRequest => "summary",
            Intent::DbOperation | Intent::BranchQuery => "capi_datab",
            Intent::FileOperation => "capi_desktop",
            Intent::AnomalyQuery => "anomaly",
            Intent::GoogleWorkspace
            | Intent::GoogleGmail
            | Intent::GoogleDrive
            | Intent::GoogleCalendar => "agente_g",
            Intent::Greeting | Intent::SmallTalk => "capi_gus",
            // Clarifier chain: the conversational agent asks for detail
            Intent::Query | Intent::Unknown => "capi_gus",
        }
    }

    /// Agents expected to cooperate downstream of the recommendation
    fn cooperators(intent: Intent) -> Vec<String> {
        match intent {
            Intent::BranchQuery | Intent::DbOperation => {
                vec!["capi_elcajas".into(), "capi_gus".into()]
            }
            Intent::AnomalyQuery => vec!["capi_gus".into()],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl GraphNode for ReasoningNode {
    fn name(&self) -> &str {
        "reasoning"
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let intent = state.detected_intent;
        let enabled = self.registry.enabled_agents();

        // Precedence: explicit semantic target, then the ReAct hint, then
        // the intent-family mapping; hints only win while enabled
        let semantic_target = state
            .metadata("semantic_result")
            .and_then(|v| v.get("target_agent"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let react_hint = state
            .metadata("react_recommended_agent")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let by_intent = Self::agent_for_intent(intent).to_string();
        let mut recommended = match (semantic_target, react_hint) {
            (Some(target), _) if enabled.contains(&target) => target,
            (_, Some(hint)) if enabled.contains(&hint) => hint,
            _ => by_intent,
        };

        // Alert-monitor sweeps go to the alert engine instead of chat
        if state.workflow_mode == WorkflowMode::AlertMonitor
            && recommended == "capi_gus"
            && enabled.contains(&"capi_alertas".to_string())
        {
            recommended = "capi_alertas".to_string();
        }

        // Combined branch+anomaly sweeps fan out to both specialists
        let q = state.original_query.to_lowercase();
        let wants_parallel = q.contains("anomal")
            && (q.contains("sucursal") || q.contains("saldo") || q.contains("rendimiento"));
        let parallel_targets: Vec<String> = if wants_parallel {
            ["branch", "anomaly"]
                .iter()
                .map(|s| s.to_string())
                .filter(|agent| enabled.contains(agent))
                .collect()
        } else {
            Vec::new()
        };

        let mut plan = ReasoningPlan::new();
        plan.confidence = state.intent_confidence;
        plan.push_step(
            "clasificar",
            format!("La consulta se clasific\u{f3} como {:?}.", intent),
            None,
        );
        plan.push_step(
            "despachar",
            format!("Derivar la consulta al especialista {}.", recommended),
            Some(recommended.clone()),
        );
        plan.cooperative_agents = Self::cooperators(intent)
            .into_iter()
            .filter(|agent| enabled.contains(agent))
            .collect();
        for agent in plan.cooperative_agents.clone() {
            plan.push_step(
                "cooperar",
                format!("El agente {} complementa el resultado.", agent),
                Some(agent),
            );
        }
        plan.push_step("sintetizar", "Componer la respuesta final.", None);
        plan.recommended_agent = Some(recommended.clone());
        plan.fallback_agent = Some("capi_gus".to_string());
        plan.estimate_effort();
        plan.progress_percent = 25.0;
        debug!(recommended = %recommended, steps = plan.steps.len(), "plan built");

        let summary = format!(
            "Plan v{}: {:?} \u{2192} {} ({} pasos, complejidad {:?}).",
            plan.version,
            intent,
            recommended,
            plan.steps.len(),
            plan.complexity
        );

        let mut partial = Map::new();
        partial.insert("reasoning_plan".into(), serde_json::to_value(&plan)?);
        partial.insert("recommended_agent".into(), json!(recommended.clone()));
        if parallel_targets.len() > 1 {
            partial.insert("parallel_targets".into(), json!(parallel_targets.clone()));
        }
        let s = StateMutator::merge_metadata(&state, partial);
        let s = StateMutator::update(&s, |s| {
            s.reasoning_summary = summary;
            s.routing_decision = Some(if parallel_targets.len() > 1 {
                RoutingDecision::Fanout(parallel_targets)
            } else {
                RoutingDecision::Single(recommended)
            });
        });
        Ok(complete(&s, "reasoning"))
    }
}
