//! Agent registry and configuration
//!
//! Maps agent names to manifests and node factories. The registry is
//! read-mostly: lookups take a shared lock, registration/refresh take the
//! writer lock, and readers always observe a consistent snapshot.
//!
//! Dynamic load resolves a manifest's `node_class_path` against the table
//! of built-in constructors; external factories register programmatically
//! as the `Dynamic` source. Instantiated nodes are cached by name and the
//! cache is invalidated on refresh.

use crate::intent::HeuristicIntentService;
use crate::nodes::agents::{
    AgenteGNode, AnomalyNode, BranchNode, CapiAlertasNode, CapiDataBNode, CapiDesktopNode,
    CapiElCajasNode, CapiGusNode, CapiNoticiasNode, OfflineWorkspaceService, SummaryNode,
};
use crate::workspace::Workspace;
use agentgraph_core::GraphNode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub use crate::nodes::agents::agente_g::WorkspaceService;

/// Registration record for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub agent_name: String,
    /// Constructor path resolved by the dynamic loader
    pub node_class_path: String,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentManifest {
    pub fn new(agent_name: &str, node_class_path: &str, enabled: bool) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            node_class_path: node_class_path.to_string(),
            enabled,
            metadata: Map::new(),
        }
    }
}

/// Constructor producing a fresh node instance
pub type NodeFactory = Arc<dyn Fn() -> Arc<dyn GraphNode> + Send + Sync>;

/// Where a factory came from
#[derive(Clone)]
pub enum AgentSource {
    /// Shipped with the binary; resolved from the class-path table
    Builtin(NodeFactory),
    /// Registered at runtime by an embedder
    Dynamic(NodeFactory),
}

impl AgentSource {
    fn factory(&self) -> &NodeFactory {
        match self {
            AgentSource::Builtin(f) | AgentSource::Dynamic(f) => f,
        }
    }
}

struct RegistryInner {
    manifests: BTreeMap<String, AgentManifest>,
    sources: HashMap<String, AgentSource>,
    instances: HashMap<String, Arc<dyn GraphNode>>,
}

/// Process-wide agent registry
pub struct AgentRegistry {
    workspace: Workspace,
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    /// Empty registry over a workspace
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            inner: RwLock::new(RegistryInner {
                manifests: BTreeMap::new(),
                sources: HashMap::new(),
                instances: HashMap::new(),
            }),
        }
    }

    /// Registry preloaded with the built-in specialist set
    ///
    /// `capi_noticias` ships disabled; enabling it (or registering a new
    /// agent) takes effect on the next graph rebuild.
    pub fn with_builtin_agents(workspace: Workspace) -> Self {
        let registry = Self::new(workspace);
        for (name, enabled) in [
            ("capi_gus", true),
            ("capi_datab", true),
            ("capi_elcajas", true),
            ("capi_desktop", true),
            ("capi_alertas", true),
            ("branch", true),
            ("anomaly", true),
            ("agente_g", true),
            ("summary", true),
            ("capi_noticias", false),
        ] {
            if let Err(error) = registry.register_builtin(name, enabled) {
                warn!(agent = name, error = %error, "builtin registration failed");
            }
        }
        registry
    }

    /// Class path for a built-in agent
    fn builtin_class_path(name: &str) -> Option<&'static str> {
        Some(match name {
            "capi_gus" => "orchestrator::nodes::agents::capi_gus::CapiGusNode",
            "capi_datab" => "orchestrator::nodes::agents::capi_datab::CapiDataBNode",
            "capi_elcajas" => "orchestrator::nodes::agents::capi_elcajas::CapiElCajasNode",
            "capi_desktop" => "orchestrator::nodes::agents::capi_desktop::CapiDesktopNode",
            "capi_alertas" => "orchestrator::nodes::agents::capi_alertas::CapiAlertasNode",
            "branch" => "orchestrator::nodes::agents::branch::BranchNode",
            "anomaly" => "orchestrator::nodes::agents::anomaly::AnomalyNode",
            "agente_g" => "orchestrator::nodes::agents::agente_g::AgenteGNode",
            "summary" => "orchestrator::nodes::agents::summary::SummaryNode",
            "capi_noticias" => "orchestrator::nodes::agents::capi_noticias::CapiNoticiasNode",
            _ => return None,
        })
    }

    /// Resolve a built-in constructor from its class path
    fn resolve_builtin(&self, class_path: &str) -> Option<NodeFactory> {
        let workspace = self.workspace.clone();
        let factory: NodeFactory = match class_path.rsplit("::").next()? {
            "CapiGusNode" => Arc::new(|| Arc::new(CapiGusNode) as Arc<dyn GraphNode>),
            "CapiDataBNode" => Arc::new(move || {
                Arc::new(CapiDataBNode::new(workspace.clone())) as Arc<dyn GraphNode>
            }),
            "CapiElCajasNode" => Arc::new(|| Arc::new(CapiElCajasNode) as Arc<dyn GraphNode>),
            "CapiDesktopNode" => Arc::new(move || {
                Arc::new(CapiDesktopNode::new(workspace.clone())) as Arc<dyn GraphNode>
            }),
            "CapiAlertasNode" => Arc::new(|| Arc::new(CapiAlertasNode) as Arc<dyn GraphNode>),
            "BranchNode" => Arc::new(|| Arc::new(BranchNode) as Arc<dyn GraphNode>),
            "AnomalyNode" => Arc::new(|| Arc::new(AnomalyNode) as Arc<dyn GraphNode>),
            "AgenteGNode" => Arc::new(|| {
                Arc::new(AgenteGNode::new(Arc::new(OfflineWorkspaceService))) as Arc<dyn GraphNode>
            }),
            "SummaryNode" => Arc::new(|| Arc::new(SummaryNode) as Arc<dyn GraphNode>),
            "CapiNoticiasNode" => Arc::new(|| Arc::new(CapiNoticiasNode) as Arc<dyn GraphNode>),
            _ => return None,
        };
        Some(factory)
    }

    /// Register a built-in agent by name
    pub fn register_builtin(&self, name: &str, enabled: bool) -> Result<(), String> {
        let class_path = Self::builtin_class_path(name)
            .ok_or_else(|| format!("no builtin agent named {}", name))?;
        let factory = self
            .resolve_builtin(class_path)
            .ok_or_else(|| format!("no constructor for {}", class_path))?;

        let manifest = AgentManifest::new(name, class_path, enabled);
        let mut inner = self.inner.write();
        inner.sources
            .insert(name.to_string(), AgentSource::Builtin(factory));
        inner.manifests.insert(name.to_string(), manifest);
        inner.instances.remove(name);
        debug!(agent = name, enabled, "builtin agent registered");
        Ok(())
    }

    /// Register an externally supplied agent
    pub fn register_dynamic(&self, manifest: AgentManifest, factory: NodeFactory) {
        let name = manifest.agent_name.clone();
        let mut inner = self.inner.write();
        inner.sources
            .insert(name.clone(), AgentSource::Dynamic(factory));
        inner.manifests.insert(name.clone(), manifest);
        inner.instances.remove(&name);
        debug!(agent = %name, "dynamic agent registered");
    }

    /// Remove an agent entirely; returns whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        inner.sources.remove(name);
        inner.instances.remove(name);
        inner.manifests.remove(name).is_some()
    }

    /// All registered manifests, ordered by name
    pub fn list_registered_agents(&self) -> Vec<AgentManifest> {
        self.inner.read().manifests.values().cloned().collect()
    }

    /// Manifest for one agent
    pub fn get_agent_manifest(&self, name: &str) -> Option<AgentManifest> {
        self.inner.read().manifests.get(name).cloned()
    }

    /// Whether an agent is registered and enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.inner
            .read()
            .manifests
            .get(name)
            .map(|m| m.enabled)
            .unwrap_or(false)
    }

    /// Enable or disable an agent
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), String> {
        let mut inner = self.inner.write();
        match inner.manifests.get_mut(name) {
            Some(manifest) => {
                manifest.enabled = enabled;
                Ok(())
            }
            None => Err(format!("unknown agent {}", name)),
        }
    }

    /// Names of enabled agents, ordered
    pub fn enabled_agents(&self) -> Vec<String> {
        self.inner
            .read()
            .manifests
            .values()
            .filter(|m| m.enabled)
            .map(|m| m.agent_name.clone())
            .collect()
    }

    /// Instantiate (or fetch the cached instance of) an agent node
    ///
    /// Absent agents are a graceful skip: the caller gets `None` and a
    /// warning lands in the log.
    pub fn instantiate(&self, name: &str) -> Option<Arc<dyn GraphNode>> {
        {
            let inner = self.inner.read();
            if let Some(instance) = inner.instances.get(name) {
                return Some(instance.clone());
            }
        }

        let mut inner = self.inner.write();
        let source = match inner.sources.get(name) {
            Some(source) => source.clone(),
            None => {
                warn!(agent = name, "agent has no registered factory, skipping");
                return None;
            }
        };
        let instance = source.factory()();
        inner
            .instances
            .insert(name.to_string(), instance.clone());
        Some(instance)
    }

    /// Re-read the manifest source and drop cached instances
    pub fn refresh_registry(&self) {
        let mut inner = self.inner.write();
        inner.instances.clear();
        debug!("registry refreshed, instance cache invalidated");
    }

    /// Shared heuristic intent service for graph construction
    pub fn intent_service(&self) -> Arc<HeuristicIntentService> {
        Arc::new(HeuristicIntentService::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_core::{GraphState, NodeContext, Result as GraphResult};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> AgentRegistry {
        AgentRegistry::with_builtin_agents(Workspace::new(dir.path()))
    }

    #[test]
    fn test_builtin_set_is_registered() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let manifests = registry.list_registered_agents();
        assert_eq!(manifests.len(), 10);
        assert!(registry.is_enabled("capi_gus"));
        assert!(!registry.is_enabled("capi_noticias"));
    }

    #[test]
    fn test_set_enabled_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.set_enabled("capi_desktop", false).unwrap();
        assert!(!registry.is_enabled("capi_desktop"));
        assert!(!registry
            .enabled_agents()
            .contains(&"capi_desktop".to_string()));

        registry.set_enabled("capi_desktop", true).unwrap();
        assert!(registry.is_enabled("capi_desktop"));
    }

    #[test]
    fn test_set_enabled_unknown_agent_errors() {
        let dir = TempDir::new().unwrap();
        assert!(registry(&dir).set_enabled("ghost", true).is_err());
    }

    #[test]
    fn test_instantiate_caches_until_refresh() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let a = registry.instantiate("capi_gus").unwrap();
        let b = registry.instantiate("capi_gus").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        registry.refresh_registry();
        let c = registry.instantiate("capi_gus").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_instantiate_missing_agent_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(registry(&dir).instantiate("ghost").is_none());
    }

    struct EchoNode;

    #[async_trait]
    impl agentgraph_core::GraphNode for EchoNode {
        fn name(&self) -> &str {
            "echo"
        }
        fn is_agent_node(&self) -> bool {
            true
        }
        async fn run(&self, state: GraphState, _ctx: &NodeContext) -> GraphResult<GraphState> {
            Ok(state)
        }
    }

    #[test]
    fn test_dynamic_registration_and_unregister() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.register_dynamic(
            AgentManifest::new("echo", "external::EchoNode", true),
            Arc::new(|| Arc::new(EchoNode) as Arc<dyn agentgraph_core::GraphNode>),
        );
        assert!(registry.is_enabled("echo"));
        assert!(registry.instantiate("echo").is_some());

        assert!(registry.unregister("echo"));
        assert!(!registry.is_enabled("echo"));
        assert!(!registry.unregister("echo"));
    }
}
