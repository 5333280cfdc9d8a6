//! HTTP and WebSocket surface of the relay
//!
//! - GET / and /ws - WebSocket audio stream (one session per connection)
//! - GET /api/status - Relay health and live-session count
//! - GET /api/sessions - Stats of all live sessions
//! - GET /api/sessions/:id - Stats of one session
//! - GET /health - Health check

mod handlers;
mod routes;
mod server;
mod socket;
mod state;

pub use routes::create_router;
pub use server::{serve, shutdown_signal};
pub use socket::serve_socket;
pub use state::{AppState, DEFAULT_MAX_FRAME_BYTES};
