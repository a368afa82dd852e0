//! WebSocket handler for real-time updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use taskwire_core::event::{parse_envelope, PING};
use taskwire_core::Envelope;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::auth::authorize;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The token is checked before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let claims = match authorize(&state.signer, params.token.as_deref()) {
        Ok(claims) => claims,
        Err((status, message)) => return (status, message).into_response(),
    };
    let user_id = claims.sub;
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.tx.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Envelope>();

    let receiver_count = state.tx.receiver_count();
    info!(user_id = %user_id, receiver_count, "WebSocket client connected");

    // Forward broadcasts and keep-alive replies to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                broadcasted = rx.recv() => match broadcasted {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            debug!(message = %json, "Sending message to WebSocket client");
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Handle incoming messages from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match parse_envelope(text.as_str()) {
                    Ok(envelope) if envelope.kind == PING => {
                        if reply_tx.send(Envelope::pong()).is_err() {
                            break;
                        }
                    }
                    Ok(envelope) => {
                        debug!(kind = %envelope.kind, "Ignoring client message");
                    }
                    Err(e) => {
                        debug!(error = %e, "Unparseable client message");
                    }
                },
                Message::Close(_) => {
                    debug!("WebSocket client sent close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    // Whichever half finishes first takes the other down with it
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(user_id = %user_id, "WebSocket client disconnected");
}
