use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Audio stream (WebSocket upgrade)
        .route("/", get(handlers::stream_ws))
        .route("/ws", get(handlers::stream_ws))
        // Health check
        .route("/health", get(handlers::health_check))
        // Relay queries
        .route("/api/status", get(handlers::relay_status))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/:session_id", get(handlers::session_status))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
