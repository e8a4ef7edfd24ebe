//! End-to-end runtime scenarios: one test per seed scenario plus the
//! boundary behaviors around empty input, disabled agents, and busy
//! sessions.

use agentgraph_core::{GraphNode, GraphState, Intent, NodeContext, Result as GraphResult};
use async_trait::async_trait;
use orchestrator::config::{CheckpointBackend, RuntimeConfig};
use orchestrator::envelope::ResponseType;
use orchestrator::registry::AgentManifest;
use orchestrator::runtime::GraphRuntime;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> RuntimeConfig {
    RuntimeConfig {
        checkpoint_backend: CheckpointBackend::Memory,
        workspace_root: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    }
}

async fn runtime(dir: &TempDir) -> GraphRuntime {
    GraphRuntime::new(test_config(dir)).await.unwrap()
}

fn completed_nodes(meta: &serde_json::Map<String, Value>) -> Vec<String> {
    meta.get("completed_nodes")
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn scenario_greeting() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    let envelope = rt.process_query("s-greet", "u-1", "hola").await.unwrap();

    assert_eq!(envelope.response_type, ResponseType::Success);
    assert_eq!(envelope.intent, Intent::Greeting);
    assert!(envelope.message.contains("Hola"));

    let nodes = completed_nodes(&envelope.meta);
    for expected in [
        "start",
        "intent",
        "react",
        "reasoning",
        "supervisor",
        "loop_controller",
        "router",
        "capi_gus",
        "human_gate",
        "assemble",
        "finalize",
    ] {
        assert!(nodes.contains(&expected.to_string()), "missing {}", expected);
    }
    assert_eq!(nodes.first().unwrap(), "start");
    assert_eq!(nodes.last().unwrap(), "finalize");
}

#[tokio::test]
async fn scenario_branch_balance_query() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    let envelope = rt
        .process_query("s-branch", "u-1", "dame el saldo de la sucursal 23")
        .await
        .unwrap();

    assert_eq!(envelope.intent, Intent::BranchQuery);
    assert_eq!(envelope.response_type, ResponseType::Success);

    // datab rows flowed into the envelope, and the export file exists
    let rows = envelope.data["artifacts"]["capi_datab"]["rows"]
        .as_array()
        .unwrap()
        .clone();
    assert!(!rows.is_empty());
    assert_eq!(rows[0]["sucursal"], json!(23));

    let export = envelope.data["datab_export"].as_str().unwrap();
    assert!(std::path::Path::new(export).exists());

    // The cash-policy hop and the conversational synthesis both ran
    let nodes = completed_nodes(&envelope.meta);
    assert!(nodes.contains(&"capi_datab".to_string()));
    assert!(nodes.contains(&"capi_elcajas".to_string()));
    assert!(nodes.contains(&"capi_gus".to_string()));
    assert!(envelope.message.contains("sucursal 23"));
}

#[tokio::test]
async fn scenario_destructive_sql_requires_approval() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    let query = r#"{"operation":"update","table":"t","values":{"x":1},"conditions":{"id":1}}"#;
    let envelope = rt.process_query("s-sql", "u-1", query).await.unwrap();

    assert_eq!(envelope.response_type, ResponseType::Notice);
    assert!(envelope.requires_human());
    assert_eq!(envelope.meta["interrupt"]["node"], json!("capi_datab"));
    assert_eq!(
        envelope.meta["interrupt"]["payload"]["operation"],
        json!("update")
    );

    // Approve: the operation applies and exports a receipt
    let envelope = rt
        .resume_human_gate("s-sql", json!({"approved": true}))
        .await
        .unwrap();

    assert!(envelope.message.contains("aplicada"));
    assert!(envelope.data["datab_export"].is_string());
    let nodes = completed_nodes(&envelope.meta);
    assert_eq!(nodes.last().unwrap(), "finalize");
}

#[tokio::test]
async fn scenario_disabled_agent_falls_back_gracefully() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;
    rt.unregister_agent("capi_desktop").unwrap();

    let envelope = rt
        .process_query("s-desktop", "u-1", "abr\u{ed} el archivo reporte.xlsx")
        .await
        .unwrap();

    // No failure: the turn degrades to the conversational agent with an
    // explanation of the limitation
    assert_eq!(envelope.response_type, ResponseType::Notice);
    assert!(envelope.message.contains("capi_desktop"));

    let nodes = completed_nodes(&envelope.meta);
    assert!(!nodes.contains(&"capi_desktop".to_string()));
    assert!(nodes.contains(&"capi_gus".to_string()));
    assert_eq!(nodes.last().unwrap(), "finalize");
}

#[tokio::test]
async fn scenario_parallel_fanout_merges_both_agents() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;
    let subscriber = rt.gateway().register("s-fan");

    let envelope = rt
        .process_query("s-fan", "u-1", "analiza la sucursal 5 y busca anomalias")
        .await
        .unwrap();

    // Both specialists produced artifacts and assemble merged them
    assert!(envelope.data["artifacts"]["branch"].is_object());
    assert!(envelope.data["artifacts"]["anomaly"].is_object());
    assert!(envelope.message.contains("Sucursal 5"));
    assert!(envelope.message.contains("an\u{f3}malo"));

    // Exactly two agent_start and two agent_end frames
    let mut starts = 0;
    let mut ends = 0;
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(50), subscriber.recv()).await
    {
        match frame["type"].as_str() {
            Some("agent_start") => starts += 1,
            Some("agent_end") => ends += 1,
            _ => {}
        }
    }
    assert_eq!(starts, 2);
    assert_eq!(ends, 2);
}

#[tokio::test]
async fn scenario_checkpoint_resume_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = RuntimeConfig {
        checkpoint_backend: CheckpointBackend::Sqlite,
        checkpoint_path: dir.path().join("checkpoints.db"),
        workspace_root: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    };

    let query = r#"{"operation":"update","table":"t","values":{"x":1},"conditions":{"id":1}}"#;
    {
        let rt = GraphRuntime::new(config.clone()).await.unwrap();
        let envelope = rt.process_query("s-restart", "u-1", query).await.unwrap();
        assert!(envelope.requires_human());
    }

    // A fresh runtime over the same stores stands in for a restart
    let rt = GraphRuntime::new(config).await.unwrap();
    let envelope = rt
        .resume_human_gate("s-restart", json!({"approved": true}))
        .await
        .unwrap();

    assert!(envelope.message.contains("aplicada"));
    assert!(envelope.data["datab_export"].is_string());
    assert_eq!(
        completed_nodes(&envelope.meta).last().unwrap(),
        "finalize"
    );
}

#[tokio::test]
async fn empty_and_whitespace_queries_error_but_complete() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    for (session, input) in [("s-empty", ""), ("s-blank", "   ")] {
        let envelope = rt.process_query(session, "u-1", input).await.unwrap();
        assert_eq!(envelope.response_type, ResponseType::Error, "input {:?}", input);
        assert!(!envelope.message.is_empty());
        assert_eq!(
            completed_nodes(&envelope.meta).last().unwrap(),
            "finalize"
        );
    }
}

#[tokio::test]
async fn all_agents_disabled_routes_to_assemble() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;
    for manifest in rt.registry().list_registered_agents() {
        rt.registry()
            .set_enabled(&manifest.agent_name, false)
            .unwrap();
    }
    rt.refresh_graph().unwrap();

    let envelope = rt
        .process_query("s-none", "u-1", "dame el saldo de la sucursal 23")
        .await
        .unwrap();

    assert_eq!(envelope.response_type, ResponseType::Notice);
    assert!(!envelope.message.is_empty());
    let nodes = completed_nodes(&envelope.meta);
    assert!(nodes.contains(&"assemble".to_string()));
    assert!(!nodes.iter().any(|n| n.starts_with("capi_")));
}

struct SlowNode;

#[async_trait]
impl GraphNode for SlowNode {
    fn name(&self) -> &str {
        "lento"
    }
    fn is_agent_node(&self) -> bool {
        true
    }
    async fn run(&self, state: GraphState, _ctx: &NodeContext) -> GraphResult<GraphState> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(state)
    }
}

#[tokio::test]
async fn concurrent_turns_on_one_session_are_rejected() {
    let dir = TempDir::new().unwrap();
    let rt = Arc::new(runtime(&dir).await);

    rt.registry().register_dynamic(
        AgentManifest::new("lento", "tests::SlowNode", true),
        Arc::new(|| Arc::new(SlowNode) as Arc<dyn GraphNode>),
    );
    rt.refresh_graph().unwrap();

    let first = {
        let rt = rt.clone();
        tokio::spawn(async move {
            rt.process_query(
                "s-busy",
                "u-1",
                r#"{"query":"tarea larga","target_agent":"lento"}"#,
            )
            .await
        })
    };

    // Give the first turn time to reach the slow agent
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = rt.process_query("s-busy", "u-1", "hola").await;
    assert!(matches!(
        second,
        Err(orchestrator::OrchestratorError::SessionBusy(_))
    ));

    // A different session is unaffected
    let other = rt.process_query("s-other", "u-1", "hola").await.unwrap();
    assert_eq!(other.response_type, ResponseType::Success);

    let first = first.await.unwrap().unwrap();
    assert_eq!(
        completed_nodes(&first.meta).last().unwrap(),
        "finalize"
    );
}

#[tokio::test]
async fn session_history_and_admin_surface() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    rt.process_query("s-hist", "u-1", "hola").await.unwrap();
    rt.process_query("s-hist", "u-1", "dame el saldo de la sucursal 2")
        .await
        .unwrap();

    let history = rt.get_session_history("s-hist").await.unwrap();
    assert!(history.len() >= 4); // two user turns, two agent replies

    let sessions = rt.list_active_sessions().await.unwrap();
    assert!(sessions.contains(&"s-hist".to_string()));

    rt.clear_session_history("s-hist").await.unwrap();
    assert!(rt.get_session_history("s-hist").await.unwrap().is_empty());
}

#[tokio::test]
async fn dynamic_registry_surface_reports_status() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir).await;

    let before = rt.graph_status();
    assert!(!before.nodes.contains(&"capi_noticias".to_string()));

    rt.register_agent("capi_noticias").unwrap();
    let after = rt.graph_status();
    assert!(after.nodes.contains(&"capi_noticias".to_string()));
    assert!(after.version > before.version);
    assert!(after.enabled_agents.contains(&"capi_noticias".to_string()));

    rt.unregister_agent("capi_noticias").unwrap();
    assert!(!rt
        .graph_status()
        .nodes
        .contains(&"capi_noticias".to_string()));
}
