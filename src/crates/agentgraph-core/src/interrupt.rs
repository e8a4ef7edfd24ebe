//! Cooperative interrupts for human-in-the-loop pauses
//!
//! A node raises an [`Interrupt`] (through
//! [`GraphError::Interrupted`](crate::error::GraphError::Interrupted)) to
//! pause the turn. The interpreter persists the pre-interrupt state, marks
//! the session `awaiting_human`, and returns to the caller. A subsequent
//! resume injects a [`Command`](crate::command::Command) whose decision the
//! interrupted node reads from `response_metadata.human_decision`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A cooperative pause raised by a node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interrupt {
    /// Node that raised the interrupt
    pub node: String,
    /// Why execution paused
    pub reason: String,
    /// Preview of the pending operation for the human reviewer
    pub payload: Value,
    /// Whether explicit approval is required to proceed
    pub requires_human_approval: bool,
}

impl Interrupt {
    /// Create an approval interrupt with an operation preview
    pub fn approval(node: impl Into<String>, reason: impl Into<String>, payload: Value) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
            payload,
            requires_human_approval: true,
        }
    }
}

/// Static interrupt configuration for a compiled graph
///
/// Nodes listed in `interrupt_before` pause execution just before they run,
/// independent of whether the node itself would raise.
#[derive(Debug, Clone, Default)]
pub struct InterruptConfig {
    /// Pause before these nodes execute
    pub interrupt_before: HashSet<String>,
}

impl InterruptConfig {
    /// No static interrupts
    pub fn none() -> Self {
        Self::default()
    }

    /// Pause before each of the given nodes
    pub fn before<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interrupt_before: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the node is statically interrupted
    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before.contains(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_approval_interrupt() {
        let interrupt = Interrupt::approval(
            "capi_datab",
            "destructive operation requires confirmation",
            json!({"operation": "update", "table": "t"}),
        );
        assert!(interrupt.requires_human_approval);
        assert_eq!(interrupt.node, "capi_datab");
    }

    #[test]
    fn test_interrupt_config_before() {
        let config = InterruptConfig::before(["human_gate"]);
        assert!(config.should_interrupt_before("human_gate"));
        assert!(!config.should_interrupt_before("assemble"));
    }

    #[test]
    fn test_interrupt_serde_roundtrip() {
        let interrupt = Interrupt::approval("human_gate", "approve file write", json!({"path": "x"}));
        let value = serde_json::to_value(&interrupt).unwrap();
        let restored: Interrupt = serde_json::from_value(value).unwrap();
        assert_eq!(restored, interrupt);
    }
}
