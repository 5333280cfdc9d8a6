use crate::protocol::ServerMessage;
use crate::relay::Relay;
use anyhow::Result;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use std::sync::Arc;
use tracing::{debug, error};

/// Drive one WebSocket connection through the relay
///
/// Frames are handled strictly one at a time: the next frame is not read
/// until the previous one was written and acknowledged, so a slow sink
/// pushes back on this socket only.
pub async fn serve_socket(mut socket: WebSocket, relay: Arc<Relay>) {
    let (mut session, ack) = match relay.on_connect().await {
        Ok(accepted) => accepted,
        Err(e) => {
            error!("Rejecting connection: {}", e);
            if let Err(send_err) = send(&mut socket, &ServerMessage::error(e.to_string())).await {
                debug!("Failed to report connect error: {}", send_err);
            }
            let close = Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "session setup failed".into(),
            }));
            if let Err(send_err) = socket.send(close).await {
                debug!("Failed to close rejected socket: {}", send_err);
            }
            return;
        }
    };

    if let Err(e) = send(&mut socket, &ack).await {
        relay.on_error(&mut session, &e).await;
        return;
    }

    while let Some(frame) = socket.recv().await {
        let reply = match frame {
            Ok(Message::Text(text)) => relay.on_text_frame(&mut session, &text).await,
            Ok(Message::Binary(bytes)) => Some(relay.on_binary_frame(&mut session, &bytes).await),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => {
                relay.on_error(&mut session, &e).await;
                return;
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = send(&mut socket, &reply).await {
                relay.on_error(&mut session, &e).await;
                return;
            }
        }
    }

    relay.on_close(&mut session).await;
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<()> {
    socket.send(Message::Text(message.to_json()?)).await?;
    Ok(())
}
