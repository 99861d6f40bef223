use anyhow::Result;
use tokio::sync::watch;
use std::sync::Arc;
use tracing::info;

use crate::memory::Db;
use crate::sessions::SessionStore;

use super::routes::create_router;

/// Shared by every handler.
pub struct AppState {
    pub sessions: SessionStore,
    pub db: Db,
}

pub async fn start_server(state: Arc<AppState>, bind: &str, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let app = create_router()
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Flux API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    Ok(())
}

async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    // Wait for shutdown signal
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    info!("Shutting down API server...");
}
