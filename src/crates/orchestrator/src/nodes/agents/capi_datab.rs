//! Database specialist
//!
//! Executes read queries directly and gates destructive operations behind a
//! human approval interrupt. Query results land in the
//! `shared_artifacts.capi_datab` bucket and as a JSON export under the
//! session workspace; routing hints (`el_cajas_pending`,
//! `datab_alerts_pending`, `datab_skip_human`) steer the conditional edge
//! that follows this node.

use crate::nodes::agents::first_number;
use crate::nodes::complete;
use crate::workspace::Workspace;
use agentgraph_core::{
    GraphError, GraphNode, GraphState, Interrupt, NodeContext, Result, StateMutator,
    HUMAN_DECISION_KEY,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Balances above this trigger the alert engine
const ALERT_THRESHOLD: i64 = 100_000;

/// Parsed database instruction
#[derive(Debug, Clone, PartialEq)]
struct DbInstruction {
    operation: String,
    table: Option<String>,
    values: Option<Value>,
    conditions: Option<Value>,
    branch: Option<u32>,
}

impl DbInstruction {
    fn is_write(&self) -> bool {
        matches!(self.operation.as_str(), "update" | "insert" | "delete")
    }

    fn preview(&self) -> Value {
        json!({
            "operation": self.operation,
            "table": self.table,
            "values": self.values,
            "conditions": self.conditions,
        })
    }
}

/// Database querying agent
pub struct CapiDataBNode {
    workspace: Workspace,
}

impl CapiDataBNode {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Structured payloads take precedence over natural-language parsing
    fn parse_instruction(state: &GraphState) -> DbInstruction {
        if let Some(operation) = state
            .external_payload
            .get("operation")
            .and_then(Value::as_str)
        {
            return DbInstruction {
                operation: operation.to_lowercase(),
                table: state
                    .external_payload
                    .get("table")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                values: state.external_payload.get("values").cloned(),
                conditions: state.external_payload.get("conditions").cloned(),
                branch: None,
            };
        }

        DbInstruction {
            operation: "select".to_string(),
            table: Some("saldos_sucursal".to_string()),
            values: None,
            conditions: None,
            branch: first_number(&state.original_query),
        }
    }

    /// Deterministic balance rows standing in for the finance database
    fn simulate_rows(branch: Option<u32>) -> Vec<Value> {
        let row = |n: u32| {
            json!({
                "sucursal": n,
                "saldo_total": 50_000 + i64::from(n) * 1_000,
                "cajas": 3,
            })
        };
        match branch {
            Some(n) => vec![row(n)],
            None => (1..=3).map(row).collect(),
        }
    }

    fn format_currency(amount: i64) -> String {
        format!("${}", amount)
    }

    async fn execute_read(
        &self,
        state: &GraphState,
        instruction: &DbInstruction,
    ) -> Result<GraphState> {
        let rows = Self::simulate_rows(instruction.branch);
        let alert = rows.iter().any(|row| {
            row.get("saldo_total")
                .and_then(Value::as_i64)
                .map(|saldo| saldo > ALERT_THRESHOLD)
                .unwrap_or(false)
        });

        let export_path = match self
            .workspace
            .write_export(
                &state.session_id,
                "capi_datab",
                "rows",
                "json",
                serde_json::to_vec_pretty(&rows)?.as_slice(),
            )
            .await
        {
            Ok(path) => Some(path.to_string_lossy().to_string()),
            Err(error) => {
                warn!(error = %error, "row export failed, continuing without file");
                None
            }
        };

        let message = match (instruction.branch, rows.first()) {
            (Some(n), Some(row)) => {
                let saldo = row.get("saldo_total").and_then(Value::as_i64).unwrap_or(0);
                format!(
                    "Saldo de la sucursal {}: {}.",
                    n,
                    Self::format_currency(saldo)
                )
            }
            _ => format!("Consulta ejecutada: {} filas.", rows.len()),
        };

        let mut bucket = Map::new();
        bucket.insert("rows".into(), Value::Array(rows.clone()));
        bucket.insert("operation".into(), json!(instruction.operation));
        if let Some(path) = &export_path {
            bucket.insert("export_path".into(), json!(path));
        }

        let mut s = StateMutator::merge_shared_artifact(state, "capi_datab", bucket);
        let mut data = Map::new();
        data.insert("rows".into(), Value::Array(rows.clone()));
        if let Some(path) = &export_path {
            data.insert("datab_export".into(), json!(path));
        }
        s = StateMutator::merge_response_data(&s, data);

        let mut meta = Map::new();
        meta.insert("el_cajas_pending".into(), json!(!rows.is_empty()));
        meta.insert("datab_alerts_pending".into(), json!(alert));
        meta.insert("result_summary".into(), json!(message));
        s = StateMutator::merge_metadata(&s, meta);
        s = StateMutator::record_metric(&s, "datab_rows", rows.len() as f64);
        s = StateMutator::update(&s, |s| s.response_message = message);
        Ok(s)
    }

    async fn execute_write(
        &self,
        state: &GraphState,
        instruction: &DbInstruction,
        approved: bool,
    ) -> Result<GraphState> {
        if !approved {
            debug!("destructive operation declined by reviewer");
            let message = "Operaci\u{f3}n cancelada: el revisor no aprob\u{f3} el cambio.";
            let mut bucket = Map::new();
            bucket.insert("operation".into(), json!(instruction.operation));
            bucket.insert("status".into(), json!("declined"));
            let mut s = StateMutator::merge_shared_artifact(state, "capi_datab", bucket);
            let mut meta = Map::new();
            meta.insert("datab_skip_human".into(), json!(true));
            s = StateMutator::merge_metadata(&s, meta);
            s = StateMutator::update(&s, |s| s.response_message = message.to_string());
            return Ok(s);
        }

        // Approved: apply and export the receipt
        let affected = 1u64;
        let receipt = json!({
            "operation": instruction.operation,
            "table": instruction.table,
            "values": instruction.values,
            "conditions": instruction.conditions,
            "affected_rows": affected,
        });
        let export_path = match self
            .workspace
            .write_export(
                &state.session_id,
                "capi_datab",
                "operation",
                "json",
                serde_json::to_vec_pretty(&receipt)?.as_slice(),
            )
            .await
        {
            Ok(path) => Some(path.to_string_lossy().to_string()),
            Err(error) => {
                warn!(error = %error, "operation export failed, continuing without file");
                None
            }
        };

        let message = format!(
            "Operaci\u{f3}n {} sobre {} aplicada ({} fila).",
            instruction.operation,
            instruction.table.as_deref().unwrap_or("la tabla"),
            affected
        );

        let mut bucket = Map::new();
        bucket.insert("operation".into(), json!(instruction.operation));
        bucket.insert("affected_rows".into(), json!(affected));
        bucket.insert("status".into(), json!("applied"));
        if let Some(path) = &export_path {
            bucket.insert("export_path".into(), json!(path));
        }
        let mut s = StateMutator::merge_shared_artifact(state, "capi_datab", bucket);

        let mut data = Map::new();
        data.insert("affected_rows".into(), json!(affected));
        if let Some(path) = &export_path {
            data.insert("datab_export".into(), json!(path));
        }
        s = StateMutator::merge_response_data(&s, data);

        let mut meta = Map::new();
        meta.insert("datab_skip_human".into(), json!(true));
        meta.insert("result_summary".into(), json!(message));
        s = StateMutator::merge_metadata(&s, meta);
        s = StateMutator::update(&s, |s| s.response_message = message);
        Ok(s)
    }
}

#[async_trait]
impl GraphNode for CapiDataBNode {
    fn name(&self) -> &str {
        "capi_datab"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let instruction = Self::parse_instruction(&state);
        debug!(operation = %instruction.operation, branch = ?instruction.branch, "datab instruction parsed");

        if !matches!(
            instruction.operation.as_str(),
            "select" | "update" | "insert" | "delete"
        ) {
            let message = format!(
                "No reconozco la operaci\u{f3}n '{}'; las soportadas son select, update, insert y delete.",
                instruction.operation
            );
            let mut s = StateMutator::add_error(
                &state,
                "parse_error",
                &format!("unsupported operation {}", instruction.operation),
                "capi_datab",
                Map::new(),
            );
            let mut meta = Map::new();
            meta.insert("datab_skip_human".into(), Value::Bool(true));
            s = StateMutator::merge_metadata(&s, meta);
            s = StateMutator::update(&s, |s| s.response_message = message);
            return Ok(complete(&s, "capi_datab"));
        }

        let s = if instruction.is_write() {
            match state.metadata(HUMAN_DECISION_KEY) {
                None => {
                    // Destructive operations pause for review with a preview
                    return Err(GraphError::Interrupted(Interrupt::approval(
                        "capi_datab",
                        "destructive database operation requires approval",
                        instruction.preview(),
                    )));
                }
                Some(decision) => {
                    let approved = decision
                        .get("approved")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    self.execute_write(&state, &instruction, approved).await?
                }
            }
        } else {
            self.execute_read(&state, &instruction).await?
        };

        let s = StateMutator::update(&s, |s| s.active_agent = Some("capi_datab".into()));
        Ok(complete(&s, "capi_datab"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node(dir: &TempDir) -> CapiDataBNode {
        CapiDataBNode::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn test_branch_query_produces_rows_and_export() {
        let dir = TempDir::new().unwrap();
        let state = GraphState::new("s-1", "u", "dame el saldo de la sucursal 23");

        let out = node(&dir)
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        let bucket = out.artifacts_of("capi_datab").unwrap();
        let rows = bucket["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["sucursal"], json!(23));
        assert_eq!(rows[0]["saldo_total"], json!(73_000));

        assert!(out.metadata_flag("el_cajas_pending"));
        assert!(!out.metadata_flag("datab_alerts_pending"));
        assert!(out.response_data.contains_key("datab_export"));
        assert!(out.response_message.contains("sucursal 23"));
        assert_eq!(out.completed_nodes.last().unwrap(), "capi_datab");
    }

    #[tokio::test]
    async fn test_high_balance_flags_alerts() {
        let dir = TempDir::new().unwrap();
        let state = GraphState::new("s-1", "u", "saldo de la sucursal 75");

        let out = node(&dir)
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        // 50_000 + 75 * 1_000 crosses the alert threshold
        assert!(out.metadata_flag("datab_alerts_pending"));
    }

    #[tokio::test]
    async fn test_write_without_decision_interrupts_with_preview() {
        let dir = TempDir::new().unwrap();
        let mut state = GraphState::new("s-1", "u", "");
        state.external_payload = json!({
            "operation": "update",
            "table": "t",
            "values": {"x": 1},
            "conditions": {"id": 1},
        })
        .as_object()
        .unwrap()
        .clone();

        let result = node(&dir).run(state, &NodeContext::default()).await;
        match result {
            Err(GraphError::Interrupted(interrupt)) => {
                assert_eq!(interrupt.node, "capi_datab");
                assert!(interrupt.requires_human_approval);
                assert_eq!(interrupt.payload["operation"], json!("update"));
                assert_eq!(interrupt.payload["table"], json!("t"));
            }
            other => panic!("expected interrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_approved_write_applies_and_exports() {
        let dir = TempDir::new().unwrap();
        let mut state = GraphState::new("s-1", "u", "");
        state.external_payload = json!({"operation": "update", "table": "t", "values": {"x": 1}})
            .as_object()
            .unwrap()
            .clone();
        state
            .response_metadata
            .insert(HUMAN_DECISION_KEY.into(), json!({"approved": true}));

        let out = node(&dir)
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        let bucket = out.artifacts_of("capi_datab").unwrap();
        assert_eq!(bucket["status"], json!("applied"));
        assert!(out.response_data.contains_key("datab_export"));
        assert!(out.metadata_flag("datab_skip_human"));
        assert!(out.response_message.contains("aplicada"));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let mut state = GraphState::new("s-1", "u", "");
        state.external_payload = json!({"operation": "drop", "table": "t"})
            .as_object()
            .unwrap()
            .clone();

        let out = node(&dir)
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        assert!(out.errors.iter().any(|e| e.code == "parse_error"));
        assert!(out.response_message.contains("drop"));
        assert!(out.metadata_flag("datab_skip_human"));
        assert_eq!(out.completed_nodes.last().unwrap(), "capi_datab");
    }

    #[tokio::test]
    async fn test_declined_write_reports_cancellation() {
        let dir = TempDir::new().unwrap();
        let mut state = GraphState::new("s-1", "u", "");
        state.external_payload = json!({"operation": "delete", "table": "t"})
            .as_object()
            .unwrap()
            .clone();
        state
            .response_metadata
            .insert(HUMAN_DECISION_KEY.into(), json!({"approved": false}));

        let out = node(&dir)
            .run(state, &NodeContext::default())
            .await
            .unwrap();

        let bucket = out.artifacts_of("capi_datab").unwrap();
        assert_eq!(bucket["status"], json!("declined"));
        assert!(out.response_message.contains("cancelada"));
    }
}
