use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::error::RelayError;
use super::id::SessionId;
use super::sink::Sink;
use super::stats::SessionCounters;

/// Server-side state bound to one live connection
///
/// Owned by the connection task, so frames of one connection are applied in
/// arrival order without further locking. One sink per connection lifetime:
/// once closed it is never reopened.
pub struct RelaySession {
    id: SessionId,
    sink: Option<Box<dyn Sink>>,
    counters: Arc<SessionCounters>,
    streaming: bool,
    stopped: bool,
    closed: bool,
}

impl RelaySession {
    pub(crate) fn new(id: SessionId, sink: Box<dyn Sink>, counters: Arc<SessionCounters>) -> Self {
        counters.set_sink_open(true);
        Self {
            id,
            sink: Some(sink),
            counters,
            streaming: false,
            stopped: false,
            closed: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// A `start` has been processed and no `stop` since
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// A `stop` has been processed on this connection
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_sink_open(&self) -> bool {
        self.sink.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes_written()
    }

    pub(crate) fn mark_streaming(&mut self) {
        self.streaming = true;
        self.counters.set_streaming(true);
    }

    /// Append one binary frame; returns how long the sink took
    pub(crate) async fn append(&mut self, bytes: &[u8]) -> Result<Duration, RelayError> {
        if self.stopped {
            return Err(RelayError::Stopped(self.id.clone()));
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| RelayError::SinkUnavailable(self.id.clone()))?;

        let started = Instant::now();
        match sink.append(bytes).await {
            Ok(()) => {
                self.counters.record_chunk(bytes.len());
                Ok(started.elapsed())
            }
            Err(source) => {
                self.counters.record_write_error();
                Err(RelayError::SinkWrite {
                    id: self.id.clone(),
                    source,
                })
            }
        }
    }

    /// Process `stop`: end streaming and release the sink
    pub(crate) async fn stop(&mut self) {
        self.stopped = true;
        self.streaming = false;
        self.counters.set_streaming(false);
        self.close_sink().await;
    }

    /// Flush and release the sink if it is still open
    pub(crate) async fn close_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            self.counters.set_sink_open(false);
            match sink.close().await {
                Ok(()) => info!(
                    "Audio data saved for session {} ({} bytes)",
                    self.id,
                    self.counters.bytes_written()
                ),
                Err(e) => warn!("Failed to flush sink for session {}: {}", self.id, e),
            }
        }
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
        self.streaming = false;
        self.counters.set_streaming(false);
    }
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("id", &self.id)
            .field("sink_open", &self.sink.is_some())
            .field("streaming", &self.streaming)
            .field("stopped", &self.stopped)
            .field("closed", &self.closed)
            .finish()
    }
}
