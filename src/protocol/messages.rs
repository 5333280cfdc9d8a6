use serde::{Deserialize, Serialize};

pub const STATUS_OK: &str = "ok";
pub const STATUS_RECEIVED: &str = "received";

/// Control frame sent by the recording client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Start,
    Stop,
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Unit variants of a tagged enum always serialize
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Control frame sent by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection; carries the assigned session id
    Connection {
        #[serde(rename = "userId")]
        user_id: String,
        message: String,
    },
    Start {
        status: String,
        message: String,
    },
    Stop {
        status: String,
        message: String,
    },
    /// Acknowledges one binary frame after it reached the sink
    AudioChunk {
        status: String,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn connection(user_id: impl Into<String>) -> Self {
        Self::Connection {
            user_id: user_id.into(),
            message: "Connection established".to_string(),
        }
    }

    pub fn started() -> Self {
        Self::Start {
            status: STATUS_OK.to_string(),
            message: "Started recording".to_string(),
        }
    }

    pub fn stopped() -> Self {
        Self::Stop {
            status: STATUS_OK.to_string(),
            message: "Stopped recording".to_string(),
        }
    }

    pub fn chunk_received() -> Self {
        Self::AudioChunk {
            status: STATUS_RECEIVED.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::AudioChunk { .. } => "audioChunk",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
