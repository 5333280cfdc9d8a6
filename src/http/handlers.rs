use super::socket;
use super::state::AppState;
use crate::relay::SessionId;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET / and GET /ws
/// Upgrade to a WebSocket carrying one recording session
pub async fn stream_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let relay = Arc::clone(&state.relay);

    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |upgraded| socket::serve_socket(upgraded, relay))
}

/// GET /api/status
/// Relay health and live-session count
pub async fn relay_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.status().await)
}

/// GET /api/sessions
/// Statistics of every live session
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.registry().list().await)
}

/// GET /api/sessions/:session_id
/// Statistics of one live session
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let id = SessionId::new(session_id);

    match state.relay.registry().stats(&id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
