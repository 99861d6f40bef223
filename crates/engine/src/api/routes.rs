use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use super::handlers;
use super::server::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/chat", post(handlers::handle_chat))
        .route("/tools", get(handlers::handle_list_tools))
        .route("/sessions/{id}/history", get(handlers::handle_history))
}
