mod api;
mod config;
mod discovery;
mod error;
mod history;
mod orchestrator;
mod parser;
mod registry;
mod service_context;
mod synth;
mod tracker;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::service_context::ServiceContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chaos_mcpd=info"))
        )
        .init();

    tracing::info!("Starting chaos-mcpd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/chaos-mcpd/chaos-mcpd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Registry, history thread and pipeline
    let ctx = ServiceContext::start(&config)?;
    tracing::info!(
        "Registered {} seed services; {} experiment types enabled",
        ctx.registry.len(),
        ctx.catalog.entries().len()
    );

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn discovery task
    let discovery_cancel = cancel.clone();
    let discovery_registry = ctx.registry.clone();
    let discovery_config = config.discovery.clone();
    let discovery_handle = tokio::spawn(async move {
        if let Err(e) = discovery::run(discovery_registry, discovery_config, discovery_cancel).await {
            tracing::error!("Discovery error: {}", e);
        }
    });

    // Build API router
    let tracker = ctx.tracker.clone();
    let app = api::routes::router(ctx);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(discovery_handle, server_handle);

    // Shutdown history thread
    if let Err(e) = tracker.shutdown().await {
        tracing::error!("Failed to shutdown tracker: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
