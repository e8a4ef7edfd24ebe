//! Immutable-update state mutator
//!
//! Nodes never mutate a shared state in place; they derive a new snapshot
//! through [`StateMutator`]. Concurrent readers holding a previous snapshot
//! observe a consistent value, writers produce new references.
//!
//! The mutator is a namespace of pure functions: every call clones the input
//! state and applies one delta.

use crate::state::{merge_map_one_level, ErrorRecord, GraphState, WorkflowStatus};
use chrono::Utc;
use serde_json::{Map, Value};

/// Pure state-update functions, one new snapshot per call
pub struct StateMutator;

impl StateMutator {
    /// Derive a new snapshot by applying an arbitrary delta
    ///
    /// The closure receives the cloned state; the original is untouched.
    pub fn update(state: &GraphState, f: impl FnOnce(&mut GraphState)) -> GraphState {
        let mut next = state.clone();
        f(&mut next);
        next
    }

    /// Set the lifecycle status
    pub fn set_status(state: &GraphState, status: WorkflowStatus) -> GraphState {
        Self::update(state, |s| s.status = status)
    }

    /// Record entry into a node
    pub fn enter_node(state: &GraphState, node: &str) -> GraphState {
        let node = node.to_string();
        Self::update(state, |s| s.current_node = node)
    }

    /// Append a node to the audit trail
    ///
    /// Idempotent at the tail: appending the node that is already last is a
    /// no-op, so replays do not duplicate entries.
    pub fn append_completed_node(state: &GraphState, node: &str) -> GraphState {
        if state.completed_nodes.last().map(String::as_str) == Some(node) {
            return state.clone();
        }
        let node = node.to_string();
        Self::update(state, |s| s.completed_nodes.push(node))
    }

    /// Shallow-merge a partial mapping into `response_metadata`
    ///
    /// Nested mappings are recursively merged one level deep; arrays union.
    pub fn merge_metadata(state: &GraphState, partial: Map<String, Value>) -> GraphState {
        Self::update(state, |s| merge_map_one_level(&mut s.response_metadata, partial))
    }

    /// Shallow-merge a partial mapping into `response_data`
    pub fn merge_response_data(state: &GraphState, partial: Map<String, Value>) -> GraphState {
        Self::update(state, |s| merge_map_one_level(&mut s.response_data, partial))
    }

    /// Write into an agent's artifact bucket
    ///
    /// Only the owning agent may call this for its own name; `assemble`
    /// reads all buckets.
    pub fn merge_shared_artifact(
        state: &GraphState,
        agent: &str,
        partial: Map<String, Value>,
    ) -> GraphState {
        let agent = agent.to_string();
        Self::update(state, |s| {
            let bucket = s.shared_artifacts.entry(agent).or_default();
            merge_map_one_level(bucket, partial);
        })
    }

    /// Record a processing metric
    pub fn record_metric(state: &GraphState, key: &str, value: f64) -> GraphState {
        let key = key.to_string();
        Self::update(state, |s| {
            s.processing_metrics.insert(key, value);
        })
    }

    /// Append an error record
    pub fn add_error(
        state: &GraphState,
        code: &str,
        message: &str,
        node: &str,
        context: Map<String, Value>,
    ) -> GraphState {
        let record = ErrorRecord {
            code: code.to_string(),
            message: message.to_string(),
            node: node.to_string(),
            context,
            occurred_at: Utc::now(),
        };
        Self::update(state, |s| s.errors.push(record))
    }
}
