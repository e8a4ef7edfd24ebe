//! File and desktop operations specialist
//!
//! Read operations (open, inspect) run directly; mutating operations
//! require the human gate to have recorded approval first. Every executed
//! operation leaves a log export under the session workspace.

use crate::nodes::complete;
use crate::workspace::Workspace;
use agentgraph_core::{GraphNode, GraphState, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Operations that change files and therefore need approval
const MUTATING_OPERATIONS: [&str; 4] = ["write", "move", "delete", "rename"];

/// Desktop/file agent
pub struct CapiDesktopNode {
    workspace: Workspace,
}

impl CapiDesktopNode {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Instruction precedence: explicit metadata hint, then payload, then query
    fn parse_instruction(state: &GraphState) -> (String, String) {
        if let Some(instruction) = state
            .metadata("desktop_instruction")
            .and_then(Value::as_str)
        {
            return ("write".to_string(), instruction.to_string());
        }
        if let Some(op) = state
            .external_payload
            .get("file_operation")
            .and_then(Value::as_str)
        {
            let target = state
                .external_payload
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return (op.to_lowercase(), target);
        }

        let q = state.original_query.to_lowercase();
        let target = state
            .original_query
            .split_whitespace()
            .find(|w| w.contains('.'))
            .unwrap_or("")
            .to_string();
        let op = if q.contains("borra") || q.contains("elimina") {
            "delete"
        } else if q.contains("mueve") || q.contains("move") {
            "move"
        } else if q.contains("escrib") || q.contains("guarda") {
            "write"
        } else {
            "open"
        };
        (op.to_string(), target)
    }
}

#[async_trait]
impl GraphNode for CapiDesktopNode {
    fn name(&self) -> &str {
        "capi_desktop"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let (operation, target) = Self::parse_instruction(&state);
        debug!(operation = %operation, target = %target, "desktop instruction parsed");

        let needs_approval = MUTATING_OPERATIONS.contains(&operation.as_str());
        let approved = state.metadata_flag("human_approved");

        if needs_approval && !approved {
            // Approval flows through the human gate; without it the
            // operation is refused, not queued
            let message = format!(
                "La operaci\u{f3}n '{}' sobre '{}' necesita aprobaci\u{f3}n y no fue autorizada.",
                operation, target
            );
            let mut meta = Map::new();
            meta.insert("desktop_denied".into(), json!(true));
            let mut s = StateMutator::merge_metadata(&state, meta);
            s = StateMutator::update(&s, |s| {
                s.response_message = message;
                s.active_agent = Some("capi_desktop".into());
            });
            return Ok(complete(&s, "capi_desktop"));
        }

        let log = json!({
            "operation": operation,
            "target": target,
            "status": "done",
        });
        let export_path = match self
            .workspace
            .write_export(
                &state.session_id,
                "capi_desktop",
                "operation",
                "json",
                serde_json::to_vec_pretty(&log)?.as_slice(),
            )
            .await
        {
            Ok(path) => Some(path.to_string_lossy().to_string()),
            Err(error) => {
                warn!(error = %error, "desktop log export failed, continuing");
                None
            }
        };

        let message = if target.is_empty() {
            format!("Operaci\u{f3}n de escritorio '{}' completada.", operation)
        } else {
            format!("Listo: '{}' sobre '{}' completada.", operation, target)
        };

        let mut bucket = Map::new();
        bucket.insert("operation".into(), json!(operation));
        bucket.insert("target".into(), json!(target));
        if let Some(path) = &export_path {
            bucket.insert("export_path".into(), json!(path));
        }
        let mut s = StateMutator::merge_shared_artifact(&state, "capi_desktop", bucket);

        let mut data = Map::new();
        data.insert(
            "desktop_result".into(),
            json!({"operation": operation, "target": target}),
        );
        if let Some(path) = &export_path {
            data.insert("export_path".into(), json!(path));
        }
        s = StateMutator::merge_response_data(&s, data);
        s = StateMutator::update(&s, |s| {
            s.response_message = message;
            s.active_agent = Some("capi_desktop".into());
        });
        Ok(complete(&s, "capi_desktop"))
    }
}
