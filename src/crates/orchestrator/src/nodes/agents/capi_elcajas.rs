//! Cash-balance policy specialist
//!
//! Reads the rows produced by `capi_datab`, checks each branch against the
//! cash policy band, and emits recommendations. A policy breach records
//! pending actions and raises the approval requirement consumed by the
//! human gate.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Cash policy band per branch
const POLICY_MIN: i64 = 10_000;
const POLICY_MAX: i64 = 100_000;

/// Cash-policy diagnostics agent
#[derive(Debug, Clone, Default)]
pub struct CapiElCajasNode;

impl CapiElCajasNode {
    fn diagnose(row: &Value) -> Value {
        let sucursal = row.get("sucursal").and_then(Value::as_u64).unwrap_or(0);
        let saldo = row.get("saldo_total").and_then(Value::as_i64).unwrap_or(0);

        let (status, recommendation) = if saldo > POLICY_MAX {
            (
                "excess",
                format!(
                    "Trasladar {} de la sucursal {} a tesorer\u{ed}a central.",
                    saldo - POLICY_MAX,
                    sucursal
                ),
            )
        } else if saldo < POLICY_MIN {
            (
                "shortfall",
                format!(
                    "Reforzar la sucursal {} con {} para cubrir el m\u{ed}nimo.",
                    sucursal,
                    POLICY_MIN - saldo
                ),
            )
        } else {
            (
                "ok",
                format!("Sucursal {} dentro de la banda de pol\u{ed}tica.", sucursal),
            )
        };

        json!({
            "sucursal": sucursal,
            "saldo_total": saldo,
            "status": status,
            "recommendation": recommendation,
        })
    }
}

#[async_trait]
impl GraphNode for CapiElCajasNode {
    fn name(&self) -> &str {
        "capi_elcajas"
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

        let diagnostics: Vec<Value> = rows.iter().map(Self::diagnose).collect();
        let breaches: Vec<&Value> = diagnostics
            .iter()
            .filter(|d| d["status"] != json!("ok"))
            .collect();
        let overall_status = if breaches.is_empty() { "ok" } else { "alert" };
        debug!(rows = rows.len(), breaches = breaches.len(), "cash policy evaluated");

        let mut bucket = Map::new();
        bucket.insert("diagnostics".into(), Value::Array(diagnostics.clone()));
        bucket.insert("status".into(), json!(overall_status));
        let mut s = StateMutator::merge_shared_artifact(&state, "capi_elcajas", bucket);

        let mut meta = Map::new();
        meta.insert("el_cajas_pending".into(), json!(false));
        meta.insert("el_cajas_status".into(), json!(overall_status));
        if !breaches.is_empty() {
            let actions: Vec<Value> = breaches
                .iter()
                .map(|d| {
                    json!({
                        "type": "cash_transfer",
                        "sucursal": d["sucursal"],
                        "detail": d["recommendation"],
                    })
                })
                .collect();
            meta.insert("actions".into(), Value::Array(actions));
            meta.insert("requires_human_approval".into(), json!(true));
        }
        s = StateMutator::merge_metadata(&s, meta);

        let breaches_count = breaches.len();
        let mut data = Map::new();
        data.insert("cash_policy".into(), Value::Array(diagnostics));
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::record_metric(&s, "el_cajas_breaches", breaches_count as f64);

        Ok(complete(&s, "capi_elcajas"))
    }
}
