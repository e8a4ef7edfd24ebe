//! Financial news specialist
//!
//! Optional agent, disabled by default in the registry; enabling it wires
//! the node into the dynamic graph on the next rebuild.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map};

/// News digest agent
#[derive(Debug, Clone, Default)]
pub struct CapiNoticiasNode;

#[async_trait]
impl GraphNode for CapiNoticiasNode {
    fn name(&self) -> &str {
        "capi_noticias"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let headlines = json!([
            {"titulo": "El banco central mantiene la tasa de referencia", "fuente": "mercados"},
            {"titulo": "Sube la demanda de efectivo en sucursales del interior", "fuente": "operaciones"},
        ]);
        let count = headlines.as_array().map(Vec::len).unwrap_or(0);
        let summary = format!("Tengo {} titulares financieros para hoy.", count);

        let mut bucket = Map::new();
        bucket.insert("headlines".into(), headlines.clone());
        bucket.insert("summary".into(), json!(summary));
        let mut s = StateMutator::merge_shared_artifact(&state, "capi_noticias", bucket);

        let mut data = Map::new();
        data.insert("news".into(), headlines);
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::update(&s, |s| {
            if s.response_message.is_empty() {
                s.response_message = summary;
            }
            s.active_agent = Some("capi_noticias".into());
        });
        Ok(complete(&s, "capi_noticias"))
    }
}
