//! WebSocket relay: every JSON message from one client is re-broadcast to all.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub(super) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: broadcast::Sender<String>) {
    info!("New relay client connected");
    let (mut sender, mut receiver) = socket.split();

    // Subscribed before the greeting: a greeted client sees every later message,
    // its own included
    let mut subscription = relay.subscribe();
    let greeting = json!({"type": "connection", "status": "connected"}).to_string();
    if sender.send(Message::Text(greeting.into())).await.is_err() {
        return;
    }

    let mut forward = tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(payload) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Relay client lagging, skipped {skipped} messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match normalize_message(text.as_str()) {
                    Some(payload) => {
                        debug!("Relaying message: {payload}");
                        // No subscribers is not an error for a relay
                        let _ = relay.send(payload);
                    }
                    None => warn!("Dropping relay message that is not valid JSON"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
    info!("Relay client disconnected");
}

/// Re-serializes a client message, or `None` if it is not JSON.
fn normalize_message(raw: &str) -> Option<String> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .map(|value| value.to_string())
}
