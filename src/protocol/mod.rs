//! Wire vocabulary shared by the relay and the recording client
//!
//! Control frames are UTF-8 JSON objects tagged by a `type` field. Binary
//! frames carry raw encoded audio and are never wrapped.

pub mod messages;

pub use messages::{ClientMessage, ServerMessage, STATUS_OK, STATUS_RECEIVED};
