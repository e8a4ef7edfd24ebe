//! Response envelope returned to the API caller

use agentgraph_core::Intent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome classification of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Turn completed and produced an answer
    #[default]
    Success,
    /// Turn completed with a caveat (pending approval, degraded path)
    Notice,
    /// Turn failed; message explains why
    Error,
}

/// The unit returned from `process_query` / `resume_human_gate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlates with the turn's event stream
    pub trace_id: String,
    /// Outcome classification
    pub response_type: ResponseType,
    /// Intent the turn was classified as
    pub intent: Intent,
    /// User-facing message; never empty
    pub message: String,
    /// Structured payload (rows, export paths, recommendations)
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Caller-facing metadata (`requires_human`, `human_timeout`, timings)
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Whether the caller must resolve a pending human gate
    pub fn requires_human(&self) -> bool {
        self.meta
            .get("requires_human")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_type_serde() {
        assert_eq!(
            serde_json::to_value(ResponseType::Notice).unwrap(),
            json!("notice")
        );
    }

    #[test]
    fn test_requires_human_flag() {
        let mut envelope = ResponseEnvelope {
            trace_id: "trace-1".into(),
            response_type: ResponseType::Notice,
            intent: Intent::DbOperation,
            message: "pending approval".into(),
            data: Map::new(),
            meta: Map::new(),
        };
        assert!(!envelope.requires_human());

        envelope.meta.insert("requires_human".into(), json!(true));
        assert!(envelope.requires_human());
    }
}
