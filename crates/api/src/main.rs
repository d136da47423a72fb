//! Development server: the HTTP API and one queue worker over in-memory
//! backends, with the demo document from [`light_api::demo`] seeded.

use anyhow::Context;

use light_api::demo::{DEMO_RESOURCE_ID, demo_orchestrator};
use light_infra::OrchestrationConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    light_observability::init();

    let config = OrchestrationConfig::from_env().context("invalid orchestration config")?;
    let bind_addr = std::env::var("LIGHT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let orchestrator = demo_orchestrator(config).context("failed to seed demo document")?;
    let worker = orchestrator
        .spawn_worker()
        .context("failed to start queue worker")?;

    let app = light_api::app::build_app(orchestrator);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(
        demo_resource_id = DEMO_RESOURCE_ID,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutting down queue worker");
    worker.shutdown();
    Ok(())
}
