use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::coordinator::ChatCoordinator;
use crate::protocol::ClientEvent;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<ChatCoordinator>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(coordinator, socket))
}

/// Drives one connection: outbound events are forwarded from the hub channel
/// on a separate task, inbound frames are handled one at a time.
async fn handle_socket(coordinator: Arc<ChatCoordinator>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (mut session, mut events) = coordinator.connect().await;
    let connection_id = session.id();

    let forward_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(%connection_id, event = event.name(), error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientEvent::parse(&text) {
                Ok(event) => {
                    // Already reported to the caller; the connection stays open.
                    let _ = coordinator.handle(&mut session, event).await;
                }
                Err(e) => {
                    debug!(%connection_id, "rejected frame: {}", e);
                    coordinator.reject(&session, &e).await;
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    coordinator.disconnect(&mut session).await;
    forward_task.abort();
    debug!(%connection_id, "connection closed");
}
