use std::sync::Arc;
use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flux_engine::api::{self, AppState};
use flux_engine::config::EngineConfig;
use flux_engine::gateway::OllamaGateway;
use flux_engine::memory::Db;
use flux_engine::orchestrator::OrchestratorConfig;
use flux_engine::sessions::SessionStore;
use flux_engine::toolkit;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Flux...");

    let config = EngineConfig::from_env()?;
    let policy = config.load_policy()?;

    let registry = toolkit::portfolio_registry(&config, config.github_token())?;
    let gateway = OllamaGateway::new(&config.ollama_url, &config.model)?;
    info!(model = gateway.model(), url = %config.ollama_url, "using Ollama gateway");

    let db = Db::open(&config.db_path)?;
    let sessions = SessionStore::new(
        Arc::new(gateway),
        Arc::new(registry),
        Arc::new(OrchestratorConfig::from_policy(&policy, config.max_rounds)),
        toolkit::system_prompt(&config.github_owner),
    )
    .with_limits(config.session_limits);
    let state = Arc::new(AppState { sessions, db });

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start API server
    let bind = config.bind.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_server(state, &bind, shutdown_rx).await {
            error!("API server crashed: {:#}", e);
        }
    });

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal...");

    let _ = shutdown_tx.send(true);
    let _ = api_handle.await;

    info!("Flux shutdown complete.");
    Ok(())
}
