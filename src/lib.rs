pub mod capture;
pub mod client;
pub mod config;
pub mod http;
pub mod protocol;
pub mod relay;

pub use capture::{
    CaptureConstraints, CaptureDevice, CaptureError, CaptureEvent, CaptureStream,
    FileCaptureDevice,
};
pub use client::{
    ClientError, ClientOptions, ConnectionStatus, RecordingClient, RecordingStatus,
    StatusSnapshot, Transport, WsTransport,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::{Relay, RelayError, SessionId, SessionIdGenerator};
