use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::id::SessionId;

/// Live counters shared between a connection task and the registry
#[derive(Debug, Default)]
pub struct SessionCounters {
    bytes_written: AtomicU64,
    chunks_written: AtomicU64,
    write_errors: AtomicU64,
    streaming: AtomicBool,
    sink_open: AtomicBool,
}

impl SessionCounters {
    pub fn record_chunk(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::SeqCst);
        self.chunks_written.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    pub fn set_sink_open(&self, open: bool) {
        self.sink_open.store(open, Ordering::SeqCst);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::SeqCst)
    }
}

/// Statistics about a live relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,

    /// Where the session's audio is persisted
    pub sink: String,

    /// When the connection was accepted
    pub opened_at: DateTime<Utc>,

    /// Whether a `start` has been processed and no `stop` since
    pub streaming: bool,

    pub sink_open: bool,

    pub bytes_written: u64,

    pub chunks_written: u64,

    pub write_errors: u64,
}

impl SessionStats {
    pub fn capture(
        session_id: &SessionId,
        sink: &str,
        opened_at: DateTime<Utc>,
        counters: &SessionCounters,
    ) -> Self {
        Self {
            session_id: session_id.clone(),
            sink: sink.to_string(),
            opened_at,
            streaming: counters.streaming.load(Ordering::SeqCst),
            sink_open: counters.sink_open.load(Ordering::SeqCst),
            bytes_written: counters.bytes_written(),
            chunks_written: counters.chunks_written(),
            write_errors: counters.write_errors.load(Ordering::SeqCst),
        }
    }
}

/// Response body of the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStatus {
    pub status: String,
    pub message: String,
    /// Number of live sessions
    pub connections: usize,
}
