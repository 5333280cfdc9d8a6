use std::io;
use thiserror::Error;

use super::id::SessionId;

/// Failures local to one relay session
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to open sink for session {id}: {source}")]
    SinkOpen {
        id: SessionId,
        #[source]
        source: io::Error,
    },

    #[error("Recording already stopped for this connection")]
    Stopped(SessionId),

    #[error("Sink for session {0} is not available")]
    SinkUnavailable(SessionId),

    #[error("Failed to write audio for session {id}: {source}")]
    SinkWrite {
        id: SessionId,
        #[source]
        source: io::Error,
    },

    #[error("Session id {0} is already in use")]
    DuplicateSession(SessionId),

    #[error("Could not allocate a unique session id after {0} attempts")]
    IdExhausted(usize),
}
