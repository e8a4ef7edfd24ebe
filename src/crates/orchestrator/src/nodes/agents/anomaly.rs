//! Anomaly detection specialist

use crate::nodes::agents::first_number;
use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Movements above this ratio of the branch balance are flagged
const ANOMALY_RATIO: f64 = 0.4;

/// Anomaly scanning agent
#[derive(Debug, Clone, Default)]
pub struct AnomalyNode;

impl AnomalyNode {
    /// Deterministic movement sample for a branch
    fn simulate_movements(sucursal: u32) -> Vec<(i64, &'static str)> {
        let base = 50_000 + i64::from(sucursal) * 1_000;
        vec![
            (base / 10, "deposito"),
            (base / 8, "extraccion"),
            // One large movement appears on every 5th branch
            (
                if sucursal % 5 == 0 { base / 2 } else { base / 20 },
                "transferencia",
            ),
        ]
    }
}

#[async_trait]
impl GraphNode for AnomalyNode {
    fn name(&self) -> &str {
        "anomaly"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let sucursal = first_number(&state.original_query).unwrap_or(1);
        let saldo = 50_000 + i64::from(sucursal) * 1_000;
        let threshold = (saldo as f64 * ANOMALY_RATIO) as i64;

        let findings: Vec<Value> = Self::simulate_movements(sucursal)
            .into_iter()
            .filter(|(amount, _)| *amount > threshold)
            .map(|(amount, kind)| {
                json!({
                    "sucursal": sucursal,
                    "tipo": kind,
                    "monto": amount,
                    "umbral": threshold,
                })
            })
            .collect();

        let summary = if findings.is_empty() {
            format!("Sin movimientos an\u{f3}malos en la sucursal {}.", sucursal)
        } else {
            format!(
                "Detect\u{e9} {} movimiento(s) an\u{f3}malo(s) en la sucursal {}.",
                findings.len(),
                sucursal
            )
        };

        let mut bucket = Map::new();
        bucket.insert("findings".into(), Value::Array(findings.clone()));
        bucket.insert("summary".into(), json!(summary));
        let mut s = StateMutator::merge_shared_artifact(&state, "anomaly", bucket);

        let mut data = Map::new();
        data.insert("anomalies".into(), Value::Array(findings));
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::update(&s, |s| {
            if s.response_message.is_empty() {
                s.response_message = summary;
            }
            s.active_agent = Some("anomaly".into());
        });
        Ok(complete(&s, "anomaly"))
    }
}
