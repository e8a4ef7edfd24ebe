//! Specialist agent nodes
//!
//! One node per specialist. All agents share the same contract: read the
//! instruction from `original_query` or `external_payload`, execute, write
//! results into `shared_artifacts[<agent>]` and `response_data`, leave
//! routing hints in `response_metadata`, and append themselves to
//! `completed_nodes`. Failures become state errors plus a user-facing
//! message; the graph then routes to `assemble`.

pub mod agente_g;
pub mod anomaly;
pub mod branch;
pub mod capi_alertas;
pub mod capi_datab;
pub mod capi_desktop;
pub mod capi_elcajas;
pub mod capi_gus;
pub mod capi_noticias;
pub mod summary;

pub use agente_g::{AgenteGNode, OfflineWorkspaceService, WorkspaceService};
pub use anomaly::AnomalyNode;
pub use branch::BranchNode;
pub use capi_alertas::CapiAlertasNode;
pub use capi_datab::CapiDataBNode;
pub use capi_desktop::CapiDesktopNode;
pub use capi_elcajas::CapiElCajasNode;
pub use capi_gus::CapiGusNode;
pub use capi_noticias::CapiNoticiasNode;
pub use summary::SummaryNode;

/// Find the first integer token in a query ("sucursal 23" -> 23)
pub(crate) fn first_number(query: &str) -> Option<u32> {
    query
        .split(|c: char| !c.is_ascii_digit())
        .find(|token| !token.is_empty())
        .and_then(|token| token.parse().ok())
}
