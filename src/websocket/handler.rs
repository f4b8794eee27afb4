//! WebSocket Handler
//!
//! Authenticates the upgrade request and runs the connection lifecycle.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::{ConnectionHub, ConnectionOwner};
use super::messages::{ClientMessage, ServerMessage};
use crate::api::{ApiError, AppState};
use crate::auth::Principal;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Session token; browsers cannot set headers on a WebSocket upgrade
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// The session token travels in `?token=`. An unknown or expired token is
/// rejected before the upgrade. The socket is closed when that token is
/// signed out, revoked or expires.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing session token"))?;
    let session = state.sessions.validate(&token).await?;
    let principal = Principal::load(&state.store, session.user_id).await?;

    let owner = ConnectionOwner::from_principal(&principal, session.token);
    let hub = Arc::clone(&state.ws_hub);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, owner)))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>, owner: ConnectionOwner) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register(tx, owner).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register WebSocket connection");
            if let Some(msg) = encode(&ServerMessage::Error {
                message: e.to_string(),
            }) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let connected = ServerMessage::Connected {
        connection_id: connection_id.clone(),
    };
    let sent = match encode(&connected) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !sent {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id).await;
        return;
    }

    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else { continue };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                return;
            }
        }
        // Channel closed by the hub
        let _ = sender.close().await;
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket frame
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(hub: &Arc<ConnectionHub>, connection_id: &str, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(hub, connection_id, client_msg).await,
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Invalid client message");
                    let error_msg = ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = hub.send_to(connection_id, error_msg).await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let error_msg = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

async fn handle_client_message(hub: &Arc<ConnectionHub>, connection_id: &str, message: ClientMessage) {
    let response = match message {
        ClientMessage::Subscribe { topics } => hub
            .subscribe(connection_id, topics)
            .await
            .map(|topics| ServerMessage::Subscribed { topics }),
        ClientMessage::Unsubscribe { topics } => hub
            .unsubscribe(connection_id, topics)
            .await
            .map(|topics| ServerMessage::Unsubscribed { topics }),
        ClientMessage::Ping => Ok(ServerMessage::Pong),
    };

    let response = response.unwrap_or_else(|e| {
        tracing::error!(connection_id = %connection_id, error = %e, "Subscription error");
        ServerMessage::Error {
            message: e.to_string(),
        }
    });
    let _ = hub.send_to(connection_id, response).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Role;
    use crate::websocket::HubConfig;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_client_messages_get_answers() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let principal = Principal::new(Uuid::new_v4(), "ana@example.com", Role::User);
        let owner = ConnectionOwner::from_principal(&principal, "token");
        let id = hub.register(tx, owner).await.unwrap();

        let frame = Message::Text(r#"{"type":"subscribe","topics":["system","bogus"]}"#.to_string());
        assert!(handle_ws_message(&hub, &id, frame).await);
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Subscribed {
                topics: vec!["system".to_string()]
            })
        );

        assert!(handle_ws_message(&hub, &id, Message::Text("nonsense".to_string())).await);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Error { .. })));

        assert!(handle_ws_message(&hub, &id, Message::Text(r#"{"type":"ping"}"#.to_string())).await);
        assert_eq!(rx.recv().await, Some(ServerMessage::Pong));

        assert!(!handle_ws_message(&hub, &id, Message::Close(None)).await);
    }
}
