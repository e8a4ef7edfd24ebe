//! Orchestration nodes
//!
//! The named processing units of the conversation graph. Control nodes
//! (start, intent, react, reasoning, supervisor, loop_controller, router,
//! human_gate, assemble, finalize) drive the turn; agent nodes under
//! [`agents`] wrap the specialists.
//!
//! Every node follows the same contract: consume a state, return a new
//! state, append itself to `completed_nodes`, and translate its own faults
//! into state updates rather than raising.

pub mod agents;
pub mod assemble;
pub mod control;
pub mod human_gate;
pub mod intent;
pub mod loop_controller;
pub mod react;
pub mod reasoning;
pub mod router;
pub mod supervisor;

pub use assemble::AssembleNode;
pub use control::{FinalizeNode, StartNode};
pub use human_gate::HumanGateNode;
pub use intent::IntentNode;
pub use loop_controller::LoopControllerNode;
pub use react::ReActNode;
pub use reasoning::ReasoningNode;
pub use router::RouterNode;
pub use supervisor::SupervisorNode;

use agentgraph_core::{GraphState, StateMutator};

/// Mark a node as entered and completed in one step
pub(crate) fn complete(state: &GraphState, node: &str) -> GraphState {
    let entered = StateMutator::enter_node(state, node);
    StateMutator::append_completed_node(&entered, node)
}
