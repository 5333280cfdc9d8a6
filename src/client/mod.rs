//! Recording client
//!
//! One logical session from the client side:
//! - `ClientMachine`: connection × recording state machine, pure
//! - `RecordingClient`: task executing the machine's effects against a
//!   `Transport` and a `CaptureDevice`
//! - Reconnect with bounded backoff after the transport drops
//! - Status listeners isolated from each other

mod client;
mod error;
mod machine;
mod observers;
mod reconnect;
mod status;
mod transport;
mod ws;

pub use client::{ClientOptions, RecordingClient};
pub use error::ClientError;
pub use machine::{ClientMachine, Effect};
pub use observers::{StatusCallback, StatusObservers, SubscriptionId};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use status::{ConnectionStatus, RecordingStatus, StatusSnapshot};
pub use transport::{
    LinkEnd, OutboundFrame, SendOutcome, Transport, TransportEvent, TransportLink,
};
pub use ws::WsTransport;
