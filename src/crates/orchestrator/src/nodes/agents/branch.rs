//! Branch analytics specialist

use crate::nodes::agents::first_number;
use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map};

/// Branch performance agent
#[derive(Debug, Clone, Default)]
pub struct BranchNode;

#[async_trait]
impl GraphNode for BranchNode {
    fn name(&self) -> &str {
        "branch"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let sucursal = first_number(&state.original_query).unwrap_or(1);
        // Deterministic figures derived from the branch number
        let saldo = 50_000 + i64::from(sucursal) * 1_000;
        let operaciones = 120 + i64::from(sucursal) * 3;

        let summary = format!(
            "Sucursal {}: saldo {} con {} operaciones en el periodo.",
            sucursal, saldo, operaciones
        );

        let mut bucket = Map::new();
        bucket.insert(
            "analysis".into(),
            json!({
                "sucursal": sucursal,
                "saldo_total": saldo,
                "operaciones": operaciones,
            }),
        );
        bucket.insert("summary".into(), json!(summary));
        let mut s = StateMutator::merge_shared_artifact(&state, "branch", bucket);

        let mut data = Map::new();
        data.insert(
            "branch_analysis".into(),
            json!({"sucursal": sucursal, "saldo_total": saldo}),
        );
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::update(&s, |s| {
            if s.response_message.is_empty() {
                s.response_message = summary;
            }
            s.active_agent = Some("branch".into());
        });
        Ok(complete(&s, "branch"))
    }
}
