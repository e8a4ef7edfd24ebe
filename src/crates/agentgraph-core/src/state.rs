//! Conversation-scoped graph state
//!
//! [`GraphState`] is the single record threaded through every node of the
//! graph for one turn. Updates are value-semantic: nodes receive a state and
//! return a new one; no node ever observes a partial write. The
//! [`StateMutator`](crate::mutator::StateMutator) produces the new snapshots.
//!
//! # Invariants
//!
//! - `trace_id` is immutable after initialization
//! - `completed_nodes` is append-only within a turn
//! - `errors` grows only
//! - `shared_artifacts[agent]` is written only by agent `agent` (the
//!   `assemble` node reads all buckets)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Root behavior selector for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Conversational query/response
    #[default]
    Chat,
    /// Scheduled alert monitoring sweep
    AlertMonitor,
}

/// Lifecycle of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Initialized,
    Processing,
    AwaitingHuman,
    Completed,
    Failed,
}

/// Intent taxonomy assigned by the intent node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    SmallTalk,
    SummaryRequest,
    BranchQuery,
    AnomalyQuery,
    FileOperation,
    DbOperation,
    GoogleWorkspace,
    GoogleGmail,
    GoogleDrive,
    GoogleCalendar,
    Query,
    #[default]
    Unknown,
}

impl Intent {
    /// Whether this intent belongs to the Google Workspace family
    pub fn is_google(&self) -> bool {
        matches!(
            self,
            Intent::GoogleWorkspace | Intent::GoogleGmail | Intent::GoogleDrive | Intent::GoogleCalendar
        )
    }
}

/// Next node(s) chosen by routing; a list means parallel fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutingDecision {
    /// Route to a single node
    Single(String),
    /// Execute multiple nodes concurrently, converging at `assemble`
    Fanout(Vec<String>),
}

impl RoutingDecision {
    /// Targets as a slice regardless of arity
    pub fn targets(&self) -> Vec<&str> {
        match self {
            RoutingDecision::Single(t) => vec![t.as_str()],
            RoutingDecision::Fanout(ts) => ts.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for RoutingDecision {
    fn from(target: &str) -> Self {
        RoutingDecision::Single(target.to_string())
    }
}

impl From<Vec<String>> for RoutingDecision {
    fn from(targets: Vec<String>) -> Self {
        RoutingDecision::Fanout(targets)
    }
}

/// A fault accumulated during the turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Machine-readable code (see the error taxonomy)
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Node that recorded the fault
    pub node: String,
    /// Structured context
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// When the fault was recorded
    pub occurred_at: DateTime<Utc>,
}

/// One turn of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the turn
    pub role: TurnRole,
    /// Turn text
    pub content: String,
    /// When the turn happened
    pub created_at: DateTime<Utc>,
}

/// Origin of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Agent,
    System,
}

/// The single conversation-scoped record threaded through the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    /// Stable per conversation; partitions all state and events
    pub session_id: String,
    /// One per turn; correlates logs and events
    pub trace_id: String,
    /// Audit / authorization
    pub user_id: String,
    /// Raw user text
    pub original_query: String,
    /// Root behavior selector
    pub workflow_mode: WorkflowMode,
    /// Structured inputs when the query is a JSON object
    #[serde(default)]
    pub external_payload: Map<String, Value>,
    /// Turn lifecycle
    pub status: WorkflowStatus,
    /// Node most recently entered
    pub current_node: String,
    /// Audit trail; grows monotonically
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    /// Assigned by the intent node
    pub detected_intent: Intent,
    /// Confidence in [0, 1]
    pub intent_confidence: f64,
    /// Next node(s); a list fans out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_decision: Option<RoutingDecision>,
    /// Currently chosen specialist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<String>,
    /// Outgoing message draft
    #[serde(default)]
    pub response_message: String,
    /// Structured payload for the caller
    #[serde(default)]
    pub response_data: Map<String, Value>,
    /// Cross-node scratch: decisions, artifact pointers, approval flags
    #[serde(default)]
    pub response_metadata: Map<String, Value>,
    /// Inter-agent handoff data, one bucket per agent
    #[serde(default)]
    pub shared_artifacts: BTreeMap<String, Map<String, Value>>,
    /// Last N turns of conversation
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    /// Short-term context window
    #[serde(default)]
    pub memory_window: Vec<Value>,
    /// Narrative from the reasoning node
    #[serde(default)]
    pub reasoning_summary: String,
    /// Latencies and counters
    #[serde(default)]
    pub processing_metrics: BTreeMap<String, f64>,
    /// Accumulated faults
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    /// Runtime tunables
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl GraphState {
    /// Create the initial state for a turn
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        original_query: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            trace_id: format!("trace-{}", Uuid::new_v4()),
            user_id: user_id.into(),
            original_query: original_query.into(),
            workflow_mode: WorkflowMode::Chat,
            external_payload: Map::new(),
            status: WorkflowStatus::Initialized,
            current_node: String::new(),
            completed_nodes: Vec::new(),
            detected_intent: Intent::Unknown,
            intent_confidence: 0.0,
            routing_decision: None,
            active_agent: None,
            response_message: String::new(),
            response_data: Map::new(),
            response_metadata: Map::new(),
            shared_artifacts: BTreeMap::new(),
            conversation_history: Vec::new(),
            memory_window: Vec::new(),
            reasoning_summary: String::new(),
            processing_metrics: BTreeMap::new(),
            errors: Vec::new(),
            config: Map::new(),
        }
    }

    /// Set the workflow mode
    pub fn with_workflow_mode(mut self, mode: WorkflowMode) -> Self {
        self.workflow_mode = mode;
        self
    }

    /// Attach a structured external payload
    pub fn with_external_payload(mut self, payload: Map<String, Value>) -> Self {
        self.external_payload = payload;
        self
    }

    /// Reuse an externally supplied trace id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Read a metadata key
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.response_metadata.get(key)
    }

    /// Read a metadata key as a boolean flag, defaulting to false
    pub fn metadata_flag(&self, key: &str) -> bool {
        self.response_metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Artifact bucket for an agent, if present
    pub fn artifacts_of(&self, agent: &str) -> Option<&Map<String, Value>> {
        self.shared_artifacts.get(agent)
    }

    /// Whether the datab artifact bucket contains a non-empty `rows` list
    pub fn has_datab_rows(&self) -> bool {
        self.artifacts_of("capi_datab")
            .and_then(|bucket| bucket.get("rows"))
            .and_then(Value::as_array)
            .map(|rows| !rows.is_empty())
            .unwrap_or(false)
    }

    /// Merge the outputs of parallel fan-out branches into `self`
    ///
    /// Deterministic merge rules, applied in branch order:
    /// scalars last-writer-wins, lists union (order-preserving, deduplicated),
    /// mappings merged recursively one level deep.
    pub fn merge_parallel(mut self, branches: Vec<GraphState>) -> GraphState {
        for branch in branches {
            union_into(&mut self.completed_nodes, branch.completed_nodes);
            for error in branch.errors {
                if !self.errors.contains(&error) {
                    self.errors.push(error);
                }
            }
            for (agent, bucket) in branch.shared_artifacts {
                let target = self.shared_artifacts.entry(agent).or_default();
                merge_map_one_level(target, bucket);
            }
            merge_map_one_level(&mut self.response_data, branch.response_data);
            merge_map_one_level(&mut self.response_metadata, branch.response_metadata);
            for (key, value) in branch.processing_metrics {
                self.processing_metrics.insert(key, value);
            }
            if !branch.response_message.is_empty() {
                if self.response_message.is_empty() {
                    self.response_message = branch.response_message;
                } else if !self.response_message.contains(&branch.response_message) {
                    self.response_message =
                        format!("{} {}", self.response_message, branch.response_message);
                }
            }
            if branch.active_agent.is_some() {
                self.active_agent = branch.active_agent;
            }
        }
        self
    }
}

/// Append items not already present, preserving order
fn union_into(target: &mut Vec<String>, source: Vec<String>) {
    for item in source {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Shallow merge with one level of recursion for nested mappings
///
/// Scalars and arrays are last-writer-wins except that arrays union when both
/// sides are arrays.
pub fn merge_map_one_level(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k, v);
                }
            }
            (Some(Value::Array(existing)), Value::Array(incoming)) => {
                for item in incoming {
                    if !existing.contains(&item) {
                        existing.push(item);
                    }
                }
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_new_state_defaults() {
        let state = GraphState::new("s-1", "u-1", "hola");
        assert_eq!(state.status, WorkflowStatus::Initialized);
        assert_eq!(state.detected_intent, Intent::Unknown);
        assert!(state.trace_id.starts_with("trace-"));
        assert!(state.completed_nodes.is_empty());
    }

    #[test]
    fn test_trace_ids_differ_per_turn() {
        let a = GraphState::new("s", "u", "q");
        let b = GraphState::new("s", "u", "q");
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn test_intent_serde_is_snake_case() {
        let json = serde_json::to_value(Intent::BranchQuery).unwrap();
        assert_eq!(json, json!("branch_query"));
    }

    #[test]
    fn test_routing_decision_untagged_serde() {
        let single: RoutingDecision = serde_json::from_value(json!("capi_gus")).unwrap();
        assert_eq!(single, RoutingDecision::Single("capi_gus".to_string()));

        let fanout: RoutingDecision = serde_json::from_value(json!(["branch", "anomaly"])).unwrap();
        assert_eq!(
            fanout,
            RoutingDecision::Fanout(vec!["branch".to_string(), "anomaly".to_string()])
        );
    }

    #[test]
    fn test_merge_map_one_level_recurses_once() {
        let mut target = map(json!({"a": {"x": 1}, "b": 1}));
        merge_map_one_level(&mut target, map(json!({"a": {"y": 2}, "b": 2, "c": 3})));

        assert_eq!(Value::Object(target), json!({"a": {"x": 1, "y": 2}, "b": 2, "c": 3}));
    }

    #[test]
    fn test_merge_map_unions_arrays() {
        let mut target = map(json!({"steps": ["start", "intent"]}));
        merge_map_one_level(&mut target, map(json!({"steps": ["intent", "router"]})));

        assert_eq!(
            Value::Object(target),
            json!({"steps": ["start", "intent", "router"]})
        );
    }

    #[test]
    fn test_merge_parallel_unions_nodes_and_artifacts() {
        let base = GraphState::new("s", "u", "q");

        let mut left = base.clone();
        left.completed_nodes = vec!["start".into(), "branch".into()];
        left.shared_artifacts
            .insert("branch".into(), map(json!({"summary": "saldo ok"})));
        left.response_message = "Sucursal 23 al dia.".into();

        let mut right = base.clone();
        right.completed_nodes = vec!["start".into(), "anomaly".into()];
        right.shared_artifacts
            .insert("anomaly".into(), map(json!({"findings": [1]})));
        right.response_message = "Sin anomalias.".into();

        let merged = base.merge_parallel(vec![left, right]);

        assert_eq!(merged.completed_nodes, vec!["start", "branch", "anomaly"]);
        assert!(merged.shared_artifacts.contains_key("branch"));
        assert!(merged.shared_artifacts.contains_key("anomaly"));
        assert!(merged.response_message.contains("Sucursal 23"));
        assert!(merged.response_message.contains("Sin anomalias"));
    }

    #[test]
    fn test_has_datab_rows() {
        let mut state = GraphState::new("s", "u", "q");
        assert!(!state.has_datab_rows());

        state
            .shared_artifacts
            .insert("capi_datab".into(), map(json!({"rows": []})));
        assert!(!state.has_datab_rows());

        state
            .shared_artifacts
            .insert("capi_datab".into(), map(json!({"rows": [{"saldo": 10}]})));
        assert!(state.has_datab_rows());
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = GraphState::new("s", "u", "dame el saldo");
        state.detected_intent = Intent::BranchQuery;
        state.routing_decision = Some(RoutingDecision::Single("capi_datab".into()));
        state.processing_metrics.insert("loop_count".into(), 1.0);

        let value = serde_json::to_value(&state).unwrap();
        let restored: GraphState = serde_json::from_value(value).unwrap();

        assert_eq!(restored.detected_intent, Intent::BranchQuery);
        assert_eq!(
            restored.routing_decision,
            Some(RoutingDecision::Single("capi_datab".into()))
        );
        assert_eq!(restored.processing_metrics.get("loop_count"), Some(&1.0));
    }
}
