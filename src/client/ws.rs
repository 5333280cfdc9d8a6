use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::transport::{LinkEnd, OutboundFrame, Transport, TransportEvent, TransportLink};

const DEFAULT_LINK_CAPACITY: usize = 64;

/// WebSocket transport
#[derive(Debug, Clone)]
pub struct WsTransport {
    link_capacity: usize,
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            link_capacity: DEFAULT_LINK_CAPACITY,
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<TransportLink> {
        let (link, end) = TransportLink::pair(self.link_capacity);
        tokio::spawn(run_socket(url.to_string(), end));
        Ok(link)
    }
}

async fn run_socket(url: String, mut end: LinkEnd) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            let _ = end.events.send(TransportEvent::Error(e.to_string())).await;
            let _ = end.events.send(TransportEvent::Closed).await;
            return;
        }
    };

    info!("WebSocket connection established: {}", url);
    if end.events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = end.outbound.recv() => {
                let message = match frame {
                    Some(OutboundFrame::Text(text)) => Message::Text(text),
                    Some(OutboundFrame::Binary(bytes)) => Message::Binary(bytes),
                    None => {
                        // Client dropped the link
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            debug!("Close frame not delivered: {}", e);
                        }
                        break;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    let _ = end.events.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    // A closed link still drains its queued frames before `None`
                    if end.events.send(TransportEvent::Text(text)).await.is_err() {
                        debug!("Dropping relay message: link closed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(bytes))) => {
                    debug!("Ignoring {} byte binary frame from relay", bytes.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = end.events.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }

    info!("WebSocket connection closed: {}", url);
    let _ = end.events.send(TransportEvent::Closed).await;
}
