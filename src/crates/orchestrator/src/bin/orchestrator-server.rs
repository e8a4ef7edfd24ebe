//! Orchestrator server binary
//!
//! Minimal wiring: the runtime plus the WebSocket event route. The REST
//! surface lives in a separate service that consumes [`GraphRuntime`]
//! programmatically.

use anyhow::Context;
use orchestrator::config::RuntimeConfig;
use orchestrator::gateway::ws;
use orchestrator::runtime::GraphRuntime;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RuntimeConfig::from_env().context("loading runtime configuration")?;
    let runtime = Arc::new(
        GraphRuntime::new(config)
            .await
            .context("building orchestration runtime")?,
    );

    let app = ws::router(runtime.gateway());
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8088".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "event gateway listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
