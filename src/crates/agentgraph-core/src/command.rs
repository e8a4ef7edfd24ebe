//! Graph control commands
//!
//! A [`Command`] carries external input back into a paused execution. The
//! only command the runtime issues today is `resume` with a human decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// External control input injected into the interpreter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Command {
    /// Value to resume from an interrupt with
    ///
    /// Delivered to the interrupted node as
    /// `response_metadata.human_decision`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
}

impl Command {
    /// Create a resume command carrying a human decision
    pub fn resume(decision: Value) -> Self {
        Self {
            resume: Some(decision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resume_command() {
        let cmd = Command::resume(json!({"approved": true}));
        assert_eq!(cmd.resume, Some(json!({"approved": true})));
    }

    #[test]
    fn test_default_command_is_empty() {
        let cmd = Command::default();
        assert!(cmd.resume.is_none());
    }
}
