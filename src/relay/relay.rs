use anyhow::Result;
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::error::RelayError;
use super::id::SessionIdGenerator;
use super::registry::SessionRegistry;
use super::session::RelaySession;
use super::sink::{FileSinkFactory, SinkFactory};
use super::stats::{RelayStatus, SessionCounters};
use crate::config::StorageConfig;
use crate::protocol::{ClientMessage, ServerMessage};

/// Attempts at minting an id that is free both in the registry and on disk
const MAX_ID_ATTEMPTS: usize = 8;

/// Sink writes slower than this are reported as backpressure
const SLOW_WRITE_THRESHOLD: Duration = Duration::from_millis(250);

/// Session registry and relay
///
/// Translates transport events of each connection into sink writes and
/// protocol replies. Transport-agnostic: the WebSocket handler feeds it
/// frames and forwards the returned replies.
pub struct Relay {
    registry: SessionRegistry,
    sinks: Arc<dyn SinkFactory>,
    ids: SessionIdGenerator,
}

impl Relay {
    pub fn new(sinks: Arc<dyn SinkFactory>, ids: SessionIdGenerator) -> Self {
        Self {
            registry: SessionRegistry::new(),
            sinks,
            ids,
        }
    }

    /// Relay persisting sessions as files under `storage.output_dir`
    pub fn from_storage(storage: &StorageConfig) -> Result<Self> {
        let sinks = FileSinkFactory::new(
            &storage.output_dir,
            storage.file_prefix.clone(),
            storage.file_extension.clone(),
        )?;

        info!(
            "Audio files will be saved to: {}",
            sinks.output_dir().display()
        );

        Ok(Self::new(
            Arc::new(sinks),
            SessionIdGenerator::new(storage.session_ids),
        ))
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Accept a connection: mint an id, open its sink, register it
    ///
    /// Returns the session and the `connection` frame to send. On error no
    /// session is left registered and the caller must close the transport.
    pub async fn on_connect(&self) -> Result<(RelaySession, ServerMessage), RelayError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            let counters = Arc::new(SessionCounters::default());

            if let Err(e) = self
                .registry
                .register(&id, self.sinks.location(&id), Arc::clone(&counters))
                .await
            {
                warn!("{}; generating another id", e);
                continue;
            }

            match self.sinks.open(&id).await {
                Ok(sink) => {
                    info!("New connection established: {}", id);
                    let ack = ServerMessage::connection(id.to_string());
                    return Ok((RelaySession::new(id, sink, counters), ack));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("Sink for session {} already exists; generating another id", id);
                    self.registry.deregister(&id).await;
                }
                Err(source) => {
                    self.registry.deregister(&id).await;
                    error!("Failed to open sink for session {}: {}", id, source);
                    return Err(RelayError::SinkOpen { id, source });
                }
            }
        }

        Err(RelayError::IdExhausted(MAX_ID_ATTEMPTS))
    }

    /// Handle a control frame; `None` means the payload was discarded
    pub async fn on_text_frame(
        &self,
        session: &mut RelaySession,
        payload: &str,
    ) -> Option<ServerMessage> {
        let message = match serde_json::from_str::<ClientMessage>(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Discarding malformed control message from {}: {}",
                    session.id(),
                    e
                );
                return None;
            }
        };

        info!(
            "Received control message: {:?} from {}",
            message,
            session.id()
        );

        let reply = match message {
            ClientMessage::Start if session.is_stopped() => {
                warn!(
                    "Ignoring start for session {}: sink already closed",
                    session.id()
                );
                ServerMessage::error(RelayError::Stopped(session.id().clone()).to_string())
            }
            ClientMessage::Start => {
                session.mark_streaming();
                ServerMessage::started()
            }
            ClientMessage::Stop => {
                session.stop().await;
                ServerMessage::stopped()
            }
        };

        Some(reply)
    }

    /// Append a binary frame to the session's sink
    ///
    /// The acknowledgement is produced only after the sink accepted the
    /// bytes; callers await this before reading the next frame.
    pub async fn on_binary_frame(&self, session: &mut RelaySession, bytes: &[u8]) -> ServerMessage {
        match session.append(bytes).await {
            Ok(elapsed) => {
                if elapsed >= SLOW_WRITE_THRESHOLD {
                    warn!(
                        "Sink backpressure for session {}: {} bytes took {:?}",
                        session.id(),
                        bytes.len(),
                        elapsed
                    );
                }
                ServerMessage::chunk_received()
            }
            Err(e @ RelayError::Stopped(_)) => {
                warn!("Rejecting audio chunk for {}: {}", session.id(), e);
                ServerMessage::error(e.to_string())
            }
            Err(e) => {
                error!("Error writing audio data: {}", e);
                ServerMessage::error("Error processing audio data")
            }
        }
    }

    /// Tear down after the transport closed. Idempotent.
    pub async fn on_close(&self, session: &mut RelaySession) {
        if session.is_closed() {
            return;
        }

        session.close_sink().await;
        session.mark_closed();
        self.registry.deregister(session.id()).await;

        info!("Connection closed: {}", session.id());
    }

    /// Tear down after a transport error. Idempotent.
    pub async fn on_error(&self, session: &mut RelaySession, err: &(dyn Display + Sync)) {
        if !session.is_closed() {
            error!("WebSocket error on session {}: {}", session.id(), err);
        }
        self.on_close(session).await;
    }

    /// Relay health and live-session count; read-only
    pub async fn status(&self) -> RelayStatus {
        RelayStatus {
            status: "ok".to_string(),
            message: "Audio streaming server is running".to_string(),
            connections: self.registry.len().await,
        }
    }
}
