//! Control-channel lifecycle
//!
//! Each channel walks Connecting -> Authenticating -> Active -> Closed. The
//! first protocol frame must be `auth`; rejection sends a terminal `error`
//! and closes. Once active, a writer task drains the tunnel's outbound queue
//! into the socket while this task routes inbound `response` frames to the
//! correlator. The subdomain is released unconditionally on close; pending
//! requests are left to their own deadlines.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_common::constants::CHANNEL_QUEUE_DEPTH;
use relay_common::{Message, Result, TunnelError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::TunnelConnection;
use crate::{AppState, allocator};

pub async fn channel_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_channel(socket, state))
}

async fn handle_channel(mut socket: WebSocket, state: AppState) {
    let (tx, rx) = mpsc::channel(CHANNEL_QUEUE_DEPTH);

    // Authenticating: nothing but a valid `auth` moves the channel forward
    let connection = loop {
        let text = match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        };

        let message = match Message::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame during handshake");
                continue;
            }
        };

        match message {
            Message::Auth { secret, subdomain } => {
                match authenticate(&state, &secret, subdomain.as_deref(), &tx) {
                    Ok(connection) => break connection,
                    Err(e) => {
                        reject(&mut socket, &e).await;
                        return;
                    }
                }
            }
            _ => warn!("ignoring non-auth message on unauthenticated channel"),
        }
    };

    let subdomain = connection.subdomain.clone();
    let ready = Message::Ready {
        subdomain: subdomain.clone(),
        url: state.config.public_url(&subdomain),
    };
    if send_message(&mut socket, &ready).await.is_err() {
        state.registry.release(&subdomain);
        return;
    }
    info!(subdomain = %subdomain, url = %state.config.public_url(&subdomain), "relay established");

    // Active
    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_channel(sink, rx));
    read_channel(stream, &state).await;

    // Closed: release is unconditional whatever took the channel down
    state.registry.release(&subdomain);
    writer.abort();
    info!(subdomain = %subdomain, "relay closed");
}

fn authenticate(
    state: &AppState,
    secret: &str,
    requested: Option<&str>,
    sender: &mpsc::Sender<Message>,
) -> Result<Arc<TunnelConnection>> {
    if !state.config.secrets.contains(secret) {
        warn!("rejected connection with invalid secret");
        return Err(TunnelError::InvalidSecret);
    }

    allocator::allocate(&state.registry, requested, sender)
}

/// Send a terminal `error` frame, then close
async fn reject(socket: &mut WebSocket, error: &TunnelError) {
    let message = Message::Error {
        message: error.to_string(),
    };
    let _ = send_message(socket, &message).await;
    let _ = socket.send(WsMessage::Close(None)).await;
}

async fn send_message(socket: &mut WebSocket, message: &Message) -> Result<()> {
    let json = message.encode()?;
    socket
        .send(WsMessage::Text(json))
        .await
        .map_err(|e| TunnelError::WebSocket(e.to_string()))
}

/// Route inbound frames until the socket closes
async fn read_channel(mut stream: SplitStream<WebSocket>, state: &AppState) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match Message::decode(&text) {
            Ok(Message::Response(response)) => {
                let id = response.id.clone();
                // a miss means the caller already received a timeout
                if state.correlator.complete(&id, response).is_err() {
                    debug!(id = %id, "dropping response for unknown request");
                }
            }
            Ok(Message::Auth { .. }) => warn!("ignoring auth on an active channel"),
            Ok(_) => warn!("ignoring unexpected message on an active channel"),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }
}

/// Drain the tunnel's outbound queue into the socket
async fn write_channel(mut sink: SplitSink<WebSocket, WsMessage>, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        let json = match message.encode() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if sink.send(WsMessage::Text(json)).await.is_err() {
            break;
        }
    }
    debug!("write task exiting");
}
