//! WebSocket handler for real-time updates.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use taskpulse_core::ClientMessage;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn, mut rx) = Connection::open(state.config.channel_capacity);
    let conn_id = conn.id();
    state.registry.register(conn.clone());
    info!(conn_id = %conn_id, connections = state.registry.len(), "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // Drain this connection's queue into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                debug!(conn_id = %conn_id, "WebSocket send failed, client disconnected");
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Handle incoming messages from client
    let recv_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => handle_client_text(&recv_conn, text.as_str()),
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_id, "WebSocket client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    conn.begin_close();
    state.registry.unregister(conn_id);
    conn.mark_closed();

    info!(
        conn_id = %conn_id,
        connections = state.registry.len(),
        dropped = conn.drop_count(),
        "WebSocket client disconnected"
    );
}

/// Apply a client → server message. Malformed input is logged and ignored.
fn handle_client_text(conn: &Arc<Connection>, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Auth { user_id }) => {
            conn.identify(user_id);
            info!(conn_id = %conn.id(), user_id, "WebSocket client identified");
        }
        Err(e) => {
            warn!(conn_id = %conn.id(), error = %e, "Ignoring malformed client message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_message_identifies_connection() {
        let (conn, _rx) = Connection::open(4);
        handle_client_text(&conn, r#"{"type":"auth","userId":21}"#);
        assert_eq!(conn.user_id(), Some(21));
    }

    #[test]
    fn test_malformed_message_is_ignored() {
        let (conn, _rx) = Connection::open(4);
        handle_client_text(&conn, "not json");
        handle_client_text(&conn, r#"{"type":"subscribe"}"#);
        assert!(conn.user_id().is_none());
        assert!(conn.is_open());
    }
}
