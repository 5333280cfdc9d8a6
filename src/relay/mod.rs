//! Session registry and relay (server side)
//!
//! This module owns everything the relay keeps per connection:
//! - Collision-free session ids
//! - One append-only sink per session
//! - Control-frame handling (`start` / `stop`) and chunk acknowledgements
//! - The registry of live sessions behind the status endpoint

mod error;
mod id;
mod registry;
mod relay;
mod session;
mod sink;
mod stats;

pub use error::RelayError;
pub use id::{IdStrategy, SessionId, SessionIdGenerator};
pub use registry::SessionRegistry;
pub use relay::Relay;
pub use session::RelaySession;
pub use sink::{FileSink, FileSinkFactory, Sink, SinkFactory};
pub use stats::{RelayStatus, SessionCounters, SessionStats};
