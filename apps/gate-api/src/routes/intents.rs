//! WebSocket stream of outbound intents for delivery clients.
//!
//! Each connection receives every intent published after it connected, one
//! JSON text frame per intent. Inbound text is ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::lifecycle::Intent;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/intents", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the upgrade completes so nothing published after the
    // handshake is missed.
    let intents = state.outbox.subscribe();
    ws.on_upgrade(move |socket| run_stream(socket, intents))
}

async fn run_stream(socket: WebSocket, mut intents: broadcast::Receiver<Arc<Intent>>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::debug!("intent stream connected");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, "intent stream read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            result = intents.recv() => {
                match result {
                    Ok(intent) => {
                        let json = match serde_json::to_string(intent.as_ref()) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::error!(?err, "failed to encode intent");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "intent stream lagged behind outbox");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("intent stream closed");
}
