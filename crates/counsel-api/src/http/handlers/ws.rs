//! WebSocket handler for real-time session event streaming.
//!
//! The `/ws/events` endpoint upgrades an HTTP connection to a WebSocket.
//! Once connected, the handler subscribes to the [`EventBus`] on
//! [`AppState`] and pushes every session event to the client as a JSON
//! text frame.
//!
//! The channel is best-effort notification only, never the source of truth
//! for money or state: consumers deduplicate by (session_id, event type)
//! and the billing_update snapshot is last-value-wins. Lagged receivers
//! (when the client is too slow to keep up) are handled gracefully: the
//! handler logs a warning and continues receiving.
//!
//! Disconnecting a WebSocket does not affect any session; billing and
//! lifecycle state are authoritative in the store.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::state::AppState;

/// Incoming command from a WebSocket client.
///
/// Clients send JSON-encoded text frames matching one of these variants.
/// Unknown or malformed messages are logged and ignored.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// Upgrade an HTTP request to a WebSocket connection for session events.
///
/// This is mounted at `/ws/events` in the router.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Core WebSocket connection handler.
///
/// Uses `tokio::select!` to multiplex between receiving events from the
/// [`EventBus`] and incoming WebSocket messages from the client.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut event_rx = state.event_bus.subscribe();

    loop {
        tokio::select! {
            // --- Branch 1: Forward EventBus events to WebSocket client ---
            event_result = event_rx.recv() => {
                match event_result {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                    // Client disconnected
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!("Failed to serialize session event: {err}");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            skipped = n,
                            "WebSocket subscriber lagged, skipping {n} events"
                        );
                        // Continue receiving -- the client will miss some
                        // events but catches up with the next ones.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // EventBus sender was dropped (server shutting down)
                        break;
                    }
                }
            }

            // --- Branch 2: Process messages from WebSocket client ---
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsCommand>(&text) {
                            Ok(WsCommand::Ping) => {
                                if ws_sender
                                    .send(Message::Text(r#"{"type":"pong"}"#.into()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::debug!("Ignoring unknown WebSocket message: {err}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        // Client disconnected
                        break;
                    }
                    Some(Err(err)) => {
                        tracing::debug!("WebSocket receive error: {err}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary/ping/pong frames are ignored
                    }
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
