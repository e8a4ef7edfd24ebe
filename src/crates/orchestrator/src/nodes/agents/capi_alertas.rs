//! Alert evaluation specialist
//!
//! Consumes the `datab_alerts_pending` hint: evaluates the queried rows
//! against the alert rules and decides whether a desktop follow-up (report
//! file) is needed. Always clears the pending flag so routing converges.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Balance level that pages an operator
const CRITICAL_BALANCE: i64 = 100_000;

/// Alert engine agent
#[derive(Debug, Clone, Default)]
pub struct CapiAlertasNode;

#[async_trait]
impl GraphNode for CapiAlertasNode {
    fn name(&self) -> &str {
        "capi_alertas"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let rows: Vec<Value> = state
            .artifacts_of("capi_datab")
            .and_then(|bucket| bucket.get("rows"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let alerts: Vec<Value> = rows
            .iter()
            .filter_map(|row| {
                let saldo = row.get("saldo_total").and_then(Value::as_i64)?;
                if saldo > CRITICAL_BALANCE {
                    Some(json!({
                        "sucursal": row.get("sucursal"),
                        "saldo_total": saldo,
                        "severity": "critical",
                        "rule": "saldo_sobre_limite",
                    }))
                } else {
                    None
                }
            })
            .collect();
        debug!(alerts = alerts.len(), "alert rules evaluated");

        let summary = if alerts.is_empty() {
            "Sin alertas activas para las sucursales consultadas.".to_string()
        } else {
            format!("{} alerta(s) cr\u{ed}tica(s) detectada(s).", alerts.len())
        };

        let mut bucket = Map::new();
        bucket.insert("alerts".into(), Value::Array(alerts.clone()));
        bucket.insert("summary".into(), json!(summary));
        let mut s = StateMutator::merge_shared_artifact(&state, "capi_alertas", bucket);

        let mut meta = Map::new();
        meta.insert("datab_alerts_pending".into(), json!(false));
        // Critical alerts produce a desktop report on the follow-up hop
        meta.insert("datab_desktop_ready".into(), json!(!alerts.is_empty()));
        if !alerts.is_empty() {
            meta.insert(
                "desktop_instruction".into(),
                json!("exportar informe de alertas"),
            );
        }
        s = StateMutator::merge_metadata(&s, meta);

        let mut data = Map::new();
        data.insert("alerts".into(), Value::Array(alerts));
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::update(&s, |s| {
            if s.response_message.is_empty() {
                s.response_message = summary;
            }
            s.active_agent = Some("capi_alertas".into());
        });
        Ok(complete(&s, "capi_alertas"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_rows(rows: Value) -> GraphState {
        let mut state = GraphState::new("s", "u", "saldo");
        let mut bucket = Map::new();
        bucket.insert("rows".into(), rows);
        state.shared_artifacts.insert("capi_datab".into(), bucket);
        state
            .response_metadata
            .insert("datab_alerts_pending".into(), json!(true));
        state
    }

    #[tokio::test]
    async fn test_critical_balance_raises_alert_and_desktop_followup() {
        let state = state_with_rows(json!([{"sucursal": 75, "saldo_total": 125_000}]));
        let out = CapiAlertasNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        let alerts = out.artifacts_of("capi_alertas").unwrap()["alerts"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(alerts.len(), 1);
        assert!(!out.metadata_flag("datab_alerts_pending"));
        assert!(out.metadata_flag("datab_desktop_ready"));
    }

    #[tokio::test]
    async fn test_normal_balance_clears_pending_flag() {
        let state = state_with_rows(json!([{"sucursal": 23, "saldo_total": 73_000}]));
        let out = CapiAlertasNode
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert!(!out.metadata_flag("datab_alerts_pending"));
        assert!(!out.metadata_flag("datab_desktop_ready"));
        assert!(out.response_message.contains("Sin alertas"));
    }
}
