//! Progress-stream ordering invariants over a full turn

use orchestrator::config::{CheckpointBackend, RuntimeConfig};
use orchestrator::runtime::GraphRuntime;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;

async fn drain(subscriber: &orchestrator::Subscriber) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(50), subscriber.recv()).await
    {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn transitions_chain_and_never_self_loop() {
    let dir = TempDir::new().unwrap();
    let rt = GraphRuntime::new(RuntimeConfig {
        checkpoint_backend: CheckpointBackend::Memory,
        workspace_root: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    })
    .await
    .unwrap();

    let subscriber = rt.gateway().register("s-events");
    rt.process_query("s-events", "u-1", "hola").await.unwrap();

    let frames = drain(&subscriber).await;
    assert!(!frames.is_empty());

    // Every frame belongs to the session and one trace
    let trace_id = frames[0]["trace_id"].as_str().unwrap().to_string();
    for frame in &frames {
        assert_eq!(frame["session_id"], Value::String("s-events".into()));
        if frame["type"] != Value::String("dropped_events".into()) {
            assert_eq!(frame["trace_id"].as_str().unwrap(), trace_id);
        }
    }

    // node_transition frames chain: from_node equals the previous to_node,
    // and no transition is a self-loop
    let transitions: Vec<(&str, &str)> = frames
        .iter()
        .filter(|f| f["type"] == Value::String("node_transition".into()))
        .map(|f| {
            (
                f["from_node"].as_str().unwrap(),
                f["to_node"].as_str().unwrap(),
            )
        })
        .collect();
    assert!(!transitions.is_empty());
    for pair in transitions.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "broken chain: {:?}", pair);
    }
    for (from, to) in &transitions {
        assert_ne!(from, to, "self transition on {}", from);
    }

    // The greeting turn runs exactly one agent, with paired start/end
    let starts = frames
        .iter()
        .filter(|f| f["type"] == Value::String("agent_start".into()))
        .count();
    let ends = frames
        .iter()
        .filter(|f| f["type"] == Value::String("agent_end".into()))
        .count();
    assert_eq!(starts, 1);
    assert_eq!(ends, 1);

    // Snapshots were emitted along the way
    assert!(frames
        .iter()
        .any(|f| f["type"] == Value::String("state_snapshot".into())));
}

#[tokio::test]
async fn subscribers_only_see_their_session() {
    let dir = TempDir::new().unwrap();
    let rt = GraphRuntime::new(RuntimeConfig {
        checkpoint_backend: CheckpointBackend::Memory,
        workspace_root: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    })
    .await
    .unwrap();

    let mine = rt.gateway().register("s-mine");
    let other = rt.gateway().register("s-other");

    rt.process_query("s-mine", "u-1", "hola").await.unwrap();

    assert!(!drain(&mine).await.is_empty());
    assert!(drain(&other).await.is_empty());
}
