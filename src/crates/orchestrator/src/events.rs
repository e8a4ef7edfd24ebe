//! Progress events pushed to subscribed clients
//!
//! Wire format per frame (snake_case keys, `emitted_at` in ISO-8601 UTC):
//!
//! ```json
//! {
//!   "type": "node_transition",
//!   "session_id": "s-1",
//!   "trace_id": "trace-...",
//!   "emitted_at": "2025-01-01T12:00:00Z",
//!   "from_node": "router",
//!   "to_node": "capi_datab",
//!   "action": "database_query",
//!   "data": {},
//!   "meta": {}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Kinds of progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    AgentStart,
    AgentEnd,
    NodeTransition,
    StateSnapshot,
    /// Synthetic event counting frames dropped for a slow subscriber
    DroppedEvents,
}

/// One frame of the per-session progress stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub session_id: String,
    pub trace_id: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ProgressEvent {
    fn base(event_type: ProgressEventType, session_id: &str, trace_id: &str) -> Self {
        Self {
            event_type,
            session_id: session_id.to_string(),
            trace_id: trace_id.to_string(),
            emitted_at: Utc::now(),
            from_node: None,
            to_node: None,
            action: None,
            data: Value::Null,
            meta: Map::new(),
        }
    }

    /// An agent node began executing
    pub fn agent_start(session_id: &str, trace_id: &str, agent: &str) -> Self {
        let mut event = Self::base(ProgressEventType::AgentStart, session_id, trace_id);
        event.data = json!({"agent": agent});
        event
    }

    /// An agent node finished executing
    pub fn agent_end(
        session_id: &str,
        trace_id: &str,
        agent: &str,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        let mut event = Self::base(ProgressEventType::AgentEnd, session_id, trace_id);
        event.data = json!({
            "agent": agent,
            "success": success,
            "duration_ms": duration_ms,
        });
        event
    }

    /// Control moved from one node to another
    pub fn node_transition(
        session_id: &str,
        trace_id: &str,
        from_node: &str,
        to_node: &str,
        action: &str,
    ) -> Self {
        let mut event = Self::base(ProgressEventType::NodeTransition, session_id, trace_id);
        event.from_node = Some(from_node.to_string());
        event.to_node = Some(to_node.to_string());
        event.action = Some(action.to_string());
        event
    }

    /// Full state snapshot after a merge step
    pub fn state_snapshot(session_id: &str, trace_id: &str, snapshot: Value) -> Self {
        let mut event = Self::base(ProgressEventType::StateSnapshot, session_id, trace_id);
        event.data = snapshot;
        event
    }

    /// Synthetic notice that `count` frames were dropped for this subscriber
    pub fn dropped_events(session_id: &str, count: u64) -> Self {
        let mut event = Self::base(ProgressEventType::DroppedEvents, session_id, "");
        event.data = json!({"dropped": count});
        event
    }
}

/// Human-readable action label for a node, used in transition frames
pub fn node_action(node: &str) -> &'static str {
    match node {
        "start" => "initialize",
        "intent" => "classify_intent",
        "react" => "reason_act",
        "reasoning" => "plan",
        "supervisor" => "validate_plan",
        "loop_controller" => "check_retry",
        "router" => "route",
        "capi_gus" => "converse",
        "capi_datab" => "database_query",
        "capi_elcajas" => "cash_policy_check",
        "capi_desktop" => "desktop_operation",
        "capi_alertas" => "alert_evaluation",
        "capi_noticias" => "news_digest",
        "branch" => "branch_analysis",
        "anomaly" => "anomaly_detection",
        "agente_g" => "google_workspace",
        "human_gate" => "await_approval",
        "assemble" => "assemble_response",
        "finalize" => "finalize",
        _ => "process",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_keys_are_snake_case() {
        let event = ProgressEvent::node_transition("s-1", "t-1", "router", "capi_datab", "route");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!("node_transition"));
        assert_eq!(value["from_node"], json!("router"));
        assert_eq!(value["to_node"], json!("capi_datab"));
        assert!(value["emitted_at"].is_string());
    }

    #[test]
    fn test_agent_events_carry_agent_name() {
        let start = ProgressEvent::agent_start("s", "t", "capi_gus");
        assert_eq!(start.data["agent"], json!("capi_gus"));

        let end = ProgressEvent::agent_end("s", "t", "capi_gus", true, 12);
        assert_eq!(end.data["success"], json!(true));
    }

    #[test]
    fn test_node_action_labels() {
        assert_eq!(node_action("capi_datab"), "database_query");
        assert_eq!(node_action("unknown_node"), "process");
    }
}
