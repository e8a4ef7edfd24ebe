//! Conversation graph topology
//!
//! Wires the orchestration nodes and the enabled agents into the standard
//! shape:
//!
//! ```text
//! start → intent → react → reasoning → supervisor → loop_controller
//! loop_controller --cond--> {router, assemble}
//! router --cond--> {<enabled agents>..., assemble}
//! capi_datab --cond--> {capi_alertas, capi_desktop, capi_elcajas, human_gate, assemble}
//! capi_alertas --cond--> {capi_desktop, assemble}
//! capi_elcajas → capi_gus
//! capi_gus → human_gate
//! <other agents> → human_gate
//! human_gate → assemble
//! assemble → finalize → END
//! ```
//!
//! Agents absent from the registry (or disabled) are skipped; the resolvers
//! only ever return targets that were actually wired.

pub mod dynamic;

pub use dynamic::{DynamicGraphBuilder, GraphStatus};

use crate::intent::SemanticIntentService;
use crate::nodes::{
    AssembleNode, FinalizeNode, HumanGateNode, IntentNode, LoopControllerNode, ReActNode,
    ReasoningNode, RouterNode, StartNode, SupervisorNode,
};
use crate::registry::AgentRegistry;
use agentgraph_checkpoint::CheckpointSaver;
use agentgraph_core::{
    CompiledGraph, EdgeResolution, ExecutionLimits, GraphBuilder, GraphState, InterruptConfig,
    Result, RoutingDecision, END,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Build the compiled conversation graph over the current registry state
pub fn build_graph(
    registry: Arc<AgentRegistry>,
    intent_service: Arc<dyn SemanticIntentService>,
    checkpointer: Arc<dyn CheckpointSaver>,
    interrupts: InterruptConfig,
    limits: ExecutionLimits,
) -> Result<CompiledGraph> {
    let mut builder = GraphBuilder::new();

    builder
        .add_node(Arc::new(StartNode))
        .add_node(Arc::new(IntentNode::new(intent_service)))
        .add_node(Arc::new(ReActNode))
        .add_node(Arc::new(ReasoningNode::new(registry.clone())))
        .add_node(Arc::new(SupervisorNode::new(registry.clone())))
        .add_node(Arc::new(LoopControllerNode))
        .add_node(Arc::new(RouterNode::new(registry.clone())))
        .add_node(Arc::new(HumanGateNode))
        .add_node(Arc::new(AssembleNode))
        .add_node(Arc::new(FinalizeNode));

    // Wire every enabled agent the registry can instantiate
    let mut wired_agents: Vec<String> = Vec::new();
    for name in registry.enabled_agents() {
        match registry.instantiate(&name) {
            Some(node) => {
                builder.add_node(node);
                wired_agents.push(name);
            }
            None => warn!(agent = %name, "enabled agent could not be instantiated, skipping"),
        }
    }
    debug!(agents = ?wired_agents, "agents wired into graph");

    builder
        .add_edge("start", "intent")
        .add_edge("intent", "react")
        .add_edge("react", "reasoning")
        .add_edge("reasoning", "supervisor")
        .add_edge("supervisor", "loop_controller");

    // loop_controller: anything other than an explicit assemble decision
    // goes back through the router
    builder.add_conditional_edge(
        "loop_controller",
        Arc::new(|state: &GraphState| match &state.routing_decision {
            Some(RoutingDecision::Single(target)) if target == "assemble" => "assemble".into(),
            None => "assemble".into(),
            _ => "router".into(),
        }),
        HashMap::from([
            ("router".to_string(), "router".to_string()),
            ("assemble".to_string(), "assemble".to_string()),
        ]),
    );

    // router: the node already resolved the decision; the edge validates it
    // against the wired targets and falls back to assemble
    let mut router_targets: Vec<String> = wired_agents.clone();
    router_targets.push("assemble".to_string());
    let available: Vec<String> = router_targets.clone();
    let mut router_map: HashMap<String, String> = HashMap::new();
    for target in &router_targets {
        router_map.insert(target.clone(), target.clone());
    }
    builder.add_conditional_edge(
        "router",
        Arc::new(move |state: &GraphState| match &state.routing_decision {
            Some(RoutingDecision::Fanout(targets)) => {
                let valid: Vec<String> = targets
                    .iter()
                    .filter(|t| available.contains(t))
                    .cloned()
                    .collect();
                if valid.is_empty() {
                    "assemble".into()
                } else {
                    EdgeResolution::Fanout(valid)
                }
            }
            Some(RoutingDecision::Single(target)) if available.contains(target) => {
                target.clone().into()
            }
            _ => "assemble".into(),
        }),
        router_map,
    );

    // capi_datab follow-ups: alerts, cash policy, desktop export, or done
    if wired_agents.iter().any(|a| a == "capi_datab") {
        let alertas = wired_agents.iter().any(|a| a == "capi_alertas");
        let elcajas = wired_agents.iter().any(|a| a == "capi_elcajas");
        let desktop = wired_agents.iter().any(|a| a == "capi_desktop");

        let mut path_map = HashMap::from([
            ("human_gate".to_string(), "human_gate".to_string()),
            ("assemble".to_string(), "assemble".to_string()),
        ]);
        if alertas {
            path_map.insert("capi_alertas".to_string(), "capi_alertas".to_string());
        }
        if elcajas {
            path_map.insert("capi_elcajas".to_string(), "capi_elcajas".to_string());
        }
        if desktop {
            path_map.insert("capi_desktop".to_string(), "capi_desktop".to_string());
        }

        builder.add_conditional_edge(
            "capi_datab",
            Arc::new(move |state: &GraphState| {
                if alertas && state.metadata_flag("datab_alerts_pending") {
                    return "capi_alertas".into();
                }
                if elcajas && (state.has_datab_rows() || state.metadata_flag("el_cajas_pending")) {
                    return "capi_elcajas".into();
                }
                if desktop && state.metadata_flag("datab_desktop_ready") {
                    return "capi_desktop".into();
                }
                if state.metadata_flag("datab_skip_human") {
                    return "assemble".into();
                }
                "human_gate".into()
            }),
            path_map,
        );
    }

    // capi_alertas: desktop report follow-up or straight to assemble
    if wired_agents.iter().any(|a| a == "capi_alertas") {
        let desktop = wired_agents.iter().any(|a| a == "capi_desktop");
        let mut path_map =
            HashMap::from([("assemble".to_string(), "assemble".to_string())]);
        if desktop {
            path_map.insert("capi_desktop".to_string(), "capi_desktop".to_string());
        }
        builder.add_conditional_edge(
            "capi_alertas",
            Arc::new(move |state: &GraphState| {
                if desktop && state.metadata_flag("datab_desktop_ready") {
                    "capi_desktop".into()
                } else {
                    "assemble".into()
                }
            }),
            path_map,
        );
    }

    // Remaining agent exits: elcajas hands to gus for synthesis, everything
    // else meets the human gate before assembly
    let gus_wired = wired_agents.iter().any(|a| a == "capi_gus");
    for agent in &wired_agents {
        match agent.as_str() {
            "capi_datab" | "capi_alertas" => {} // conditional edges above
            "capi_elcajas" if gus_wired => {
                builder.add_edge("capi_elcajas", "capi_gus");
            }
            _ => {
                builder.add_edge(agent.clone(), "human_gate");
            }
        }
    }

    builder
        .add_edge("human_gate", "assemble")
        .add_edge("assemble", "finalize")
        .add_edge("finalize", END);

    builder
        .with_checkpointer(checkpointer)
        .with_interrupts(interrupts)
        .with_limits(limits)
        .compile()
}
