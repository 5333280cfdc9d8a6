use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Event delivered by an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established
    Opened,
    /// A text (control) frame from the relay
    Text(String),
    /// The connection failed; `Closed` follows
    Error(String),
    /// The connection is gone; no further events follow
    Closed,
}

/// Frame queued for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Result of queueing an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Outbound queue at capacity; the frame was dropped
    Full,
    /// Transport already gone; the frame was dropped
    Closed,
}

/// Client half of one transport connection
///
/// Dropping the link (or calling `close`) closes the connection.
pub struct TransportLink {
    outbound: mpsc::Sender<OutboundFrame>,
    events: mpsc::Receiver<TransportEvent>,
}

/// Transport-implementation half of a `TransportLink`
pub struct LinkEnd {
    /// Frames the client wants sent; `None` once the client closed the link
    pub outbound: mpsc::Receiver<OutboundFrame>,
    /// Lifecycle and inbound events for the client
    pub events: mpsc::Sender<TransportEvent>,
}

impl TransportLink {
    /// Connected pair of link halves
    pub fn pair(capacity: usize) -> (TransportLink, LinkEnd) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        (
            TransportLink {
                outbound: outbound_tx,
                events: events_rx,
            },
            LinkEnd {
                outbound: outbound_rx,
                events: events_tx,
            },
        )
    }

    /// Queue a frame without waiting for room
    ///
    /// A transport stalled by relay backpressure reports `Full` and the frame
    /// is not queued.
    pub fn send(&self, frame: OutboundFrame) -> SendOutcome {
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Next event; a vanished transport reads as `Closed`
    pub async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }

    pub fn close(self) {
        debug!("Closing transport link");
    }
}

/// Opens persistent bidirectional connections to the relay
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting to `url`
    ///
    /// Completion is reported through the link's events (`Opened`, or
    /// `Error` then `Closed`), mirroring an event-driven socket.
    async fn open(&self, url: &str) -> Result<TransportLink>;
}
