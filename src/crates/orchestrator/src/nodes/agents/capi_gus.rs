//! Conversational specialist
//!
//! Produces the user-facing reply: greeting and small-talk responses, and
//! synthesis of whatever the upstream specialists left in the shared
//! artifact buckets.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, Intent, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Conversational agent
#[derive(Debug, Clone, Default)]
pub struct CapiGusNode;

impl CapiGusNode {
    fn greeting_reply(state: &GraphState) -> String {
        match state.detected_intent {
            Intent::Greeting => {
                "\u{a1}Hola! Soy Capi, tu asistente financiero. \u{bf}En qu\u{e9} puedo ayudarte hoy?"
                    .to_string()
            }
            Intent::SmallTalk => {
                "\u{a1}Todo en orden por aqu\u{ed}! Cuando quieras consultamos saldos o movimientos."
                    .to_string()
            }
            _ => String::new(),
        }
    }

    /// Weave specialist results into one reply
    fn synthesize(state: &GraphState) -> Option<String> {
        let mut fragments: Vec<String> = Vec::new();

        if let Some(summary) = state
            .metadata("result_summary")
            .and_then(Value::as_str)
        {
            fragments.push(summary.to_string());
        }

        if let Some(diagnostics) = state
            .artifacts_of("capi_elcajas")
            .and_then(|b| b.get("diagnostics"))
            .and_then(Value::as_array)
        {
            for diag in diagnostics {
                if let Some(rec) = diag.get("recommendation").and_then(Value::as_str) {
                    fragments.push(rec.to_string());
                }
            }
        }

        if fragments.is_empty() {
            None
        } else {
            Some(fragments.join(" "))
        }
    }
}

#[async_trait]
impl GraphNode for CapiGusNode {
    fn name(&self) -> &str {
        "capi_gus"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let reply = {
            let greeting = Self::greeting_reply(&state);
            if !greeting.is_empty() {
                greeting
            } else if let Some(synthesis) = Self::synthesize(&state) {
                synthesis
            } else if !state.response_message.is_empty() {
                state.response_message.clone()
            } else {
                format!(
                    "Recib\u{ed} tu consulta \"{}\". \u{bf}Pod\u{e9}s darme un poco m\u{e1}s de detalle?",
                    state.original_query
                )
            }
        };

        let mut bucket = Map::new();
        bucket.insert("reply".into(), json!(reply));
        let mut s = StateMutator::merge_shared_artifact(&state, "capi_gus", bucket);
        s = StateMutator::update(&s, |s| {
            s.response_message = reply;
            s.active_agent = Some("capi_gus".into());
        });
        Ok(complete(&s, "capi_gus"))
    }
}
