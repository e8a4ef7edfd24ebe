//! WebSocket bridge for the event gateway
//!
//! One route: `GET /ws/events/:session_id` upgrades to a WebSocket and
//! forwards the session's progress frames as JSON text messages. A failed
//! send disconnects the subscriber; the producer side never notices.

use crate::gateway::EventGateway;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tracing::debug;

/// Build the WebSocket router over a shared gateway
pub fn router(gateway: Arc<EventGateway>) -> Router {
    Router::new()
        .route("/ws/events/:session_id", get(ws_handler))
        .with_state(gateway)
}

async fn ws_handler(
    Path(session_id): Path<String>,
    State(gateway): State<Arc<EventGateway>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, session_id))
}

async fn handle_socket(mut socket: WebSocket, gateway: Arc<EventGateway>, session_id: String) {
    let subscriber = gateway.register(&session_id);
    let subscriber_id = subscriber.id();
    debug!(session_id = %session_id, subscriber_id = %subscriber_id, "websocket subscriber attached");

    loop {
        tokio::select! {
            frame = subscriber.recv() => {
                match frame {
                    Some(value) => {
                        if socket.send(Message::Text(value.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Client frames are ignored; the stream is push-only
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                }
            }
        }
    }

    gateway.unregister(&session_id, subscriber_id);
    debug!(session_id = %session_id, subscriber_id = %subscriber_id, "websocket subscriber detached");
}
