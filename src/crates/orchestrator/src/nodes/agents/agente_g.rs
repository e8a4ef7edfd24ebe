//! Google Workspace specialist
//!
//! Interface-level integration: the node talks to a [`WorkspaceService`]
//! trait; the shipped implementation answers from an offline mailbox so the
//! graph works without credentials. Calls run under the bounded retry used
//! for every external-I/O boundary.

use crate::nodes::complete;
use agentgraph_core::{GraphNode, GraphState, Intent, NodeContext, Result, StateMutator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tooling::async_utils::retry::{run_with_retries, RetryPolicy};
use tracing::warn;

/// Which Workspace product a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceProduct {
    Gmail,
    Drive,
    Calendar,
}

/// External Google Workspace boundary
#[async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn fetch(
        &self,
        product: WorkspaceProduct,
        query: &str,
    ) -> std::result::Result<Value, String>;
}

/// Offline service answering with canned workspace data
#[derive(Debug, Clone, Default)]
pub struct OfflineWorkspaceService;

#[async_trait]
impl WorkspaceService for OfflineWorkspaceService {
    async fn fetch(
        &self,
        product: WorkspaceProduct,
        _query: &str,
    ) -> std::result::Result<Value, String> {
        let result = match product {
            WorkspaceProduct::Gmail => json!({
                "messages": [
                    {"from": "tesoreria@capi.com", "subject": "Cierre diario", "unread": true},
                    {"from": "operaciones@capi.com", "subject": "Reporte de cajas", "unread": false},
                ],
            }),
            WorkspaceProduct::Drive => json!({
                "files": [{"name": "saldos_2025.xlsx", "modified": "2025-07-30"}],
            }),
            WorkspaceProduct::Calendar => json!({
                "events": [{"title": "Revision de tesoreria", "when": "2025-08-04T10:00:00Z"}],
            }),
        };
        Ok(result)
    }
}

/// Google Workspace agent
pub struct AgenteGNode {
    service: Arc<dyn WorkspaceService>,
    retry: RetryPolicy,
}

impl AgenteGNode {
    pub fn new(service: Arc<dyn WorkspaceService>) -> Self {
        Self {
            service,
            retry: RetryPolicy::external_io(),
        }
    }

    fn product_for(state: &GraphState) -> WorkspaceProduct {
        match state.detected_intent {
            Intent::GoogleDrive => WorkspaceProduct::Drive,
            Intent::GoogleCalendar => WorkspaceProduct::Calendar,
            Intent::GoogleGmail => WorkspaceProduct::Gmail,
            _ => {
                let q = state.original_query.to_lowercase();
                if q.contains("drive") {
                    WorkspaceProduct::Drive
                } else if q.contains("calendar") || q.contains("evento") || q.contains("reunion") {
                    WorkspaceProduct::Calendar
                } else {
                    WorkspaceProduct::Gmail
                }
            }
        }
    }

    fn summarize(product: WorkspaceProduct, result: &Value) -> String {
        match product {
            WorkspaceProduct::Gmail => {
                let count = result["messages"].as_array().map(Vec::len).unwrap_or(0);
                format!("Encontr\u{e9} {} correos recientes en tu bandeja.", count)
            }
            WorkspaceProduct::Drive => {
                let count = result["files"].as_array().map(Vec::len).unwrap_or(0);
                format!("Hay {} archivo(s) relevantes en Drive.", count)
            }
            WorkspaceProduct::Calendar => {
                let count = result["events"].as_array().map(Vec::len).unwrap_or(0);
                format!("Ten\u{e9}s {} evento(s) pr\u{f3}ximos en el calendario.", count)
            }
        }
    }
}

#[async_trait]
impl GraphNode for AgenteGNode {
    fn name(&self) -> &str {
        "agente_g"
    }

    fn is_agent_node(&self) -> bool {
        true
    }

    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> Result<GraphState> {
        let product = Self::product_for(&state);
        let query = state.original_query.clone();

        let fetched = run_with_retries(&self.retry, || {
            let service = self.service.clone();
            let query = query.clone();
            async move { service.fetch(product, &query).await }
        })
        .await;

        let s = match fetched {
            Ok(result) => {
                let summary = Self::summarize(product, &result);
                let mut bucket = Map::new();
                bucket.insert("result".into(), result.clone());
                bucket.insert("summary".into(), json!(summary));
                let mut s = StateMutator::merge_shared_artifact(&state, "agente_g", bucket);
                let mut data = Map::new();
                data.insert("workspace_result".into(), result);
                s = StateMutator::merge_response_data(&s, data);
                StateMutator::update(&s, |s| {
                    s.response_message = summary;
                    s.active_agent = Some("agente_g".into());
                })
            }
            Err(exhausted) => {
                // Degrade to a user-visible notice; the turn continues
                warn!(error = %exhausted, "workspace service unavailable after retries");
                let s = StateMutator::add_error(
                    &state,
                    "external_io_error",
                    &exhausted.to_string(),
                    "agente_g",
                    Map::new(),
                );
                StateMutator::update(&s, |s| {
                    s.response_message =
                        "No pude consultar Google Workspace en este momento.".to_string();
                    s.active_agent = Some("agente_g".into());
                })
            }
        };

        Ok(complete(&s, "agente_g"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingService;

    #[async_trait]
    impl WorkspaceService for FailingService {
        async fn fetch(
            &self,
            _product: WorkspaceProduct,
            _query: &str,
        ) -> std::result::Result<Value, String> {
            Err("network down".to_string())
        }
    }

    #[tokio::test]
    async fn test_gmail_intent_summarizes_mailbox() {
        let mut state = GraphState::new("s", "u", "revisa mi correo");
        state.detected_intent = Intent::GoogleGmail;

        let node = AgenteGNode::new(Arc::new(OfflineWorkspaceService));
        let out = node.run(state, &NodeContext::default()).await.unwrap();

        assert!(out.response_message.contains("correos"));
        let bucket = out.artifacts_of("agente_g").unwrap();
        assert!(bucket["result"]["messages"].is_array());
    }

    #[tokio::test]
    async fn test_calendar_keywords_select_product() {
        let state = GraphState::new("s", "u", "que eventos tengo en el calendario");
        assert_eq!(
            AgenteGNode::product_for(&state),
            WorkspaceProduct::Calendar
        );
    }

    #[tokio::test]
    async fn test_service_failure_degrades_gracefully() {
        let mut state = GraphState::new("s", "u", "revisa gmail");
        state.detected_intent = Intent::GoogleGmail;

        let node = AgenteGNode::new(Arc::new(FailingService));
        let out = node.run(state, &NodeContext::default()).await.unwrap();

        assert!(out.errors.iter().any(|e| e.code == "external_io_error"));
        assert!(out.response_message.contains("No pude"));
        assert_eq!(out.completed_nodes.last().unwrap(), "agente_g");
    }
}
