//! WebSocket Message Types
//!
//! Defines all message types for WebSocket communication between
//! intranet clients and the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::SessionEvent;
use crate::storage::{ChangeAction, ChangeEvent, StorageEvent, Table};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for real-time updates
    Subscribe {
        /// Topics to subscribe to (e.g., "tables.news", "tables.*")
        topics: Vec<String>,
    },
    /// Unsubscribe from topics
    Unsubscribe { topics: Vec<String> },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A record was inserted, updated or deleted
    RecordChanged {
        table: Table,
        id: Uuid,
        action: ChangeAction,
    },
    /// The whole dataset was replaced; clients should refetch
    StoreReloaded {
        /// Store handle that caused the reload, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<Uuid>,
    },
    /// The user was active somewhere; reset idle timers
    SessionActivity {
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    /// The user's session timed out
    SessionExpired { user_id: Uuid },
    /// Subscription confirmed
    Subscribed { topics: Vec<String> },
    /// Unsubscription confirmed
    Unsubscribed { topics: Vec<String> },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
    /// Connection established
    Connected { connection_id: String },
}

/// Internal event for broadcasting through the hub
#[derive(Debug, Clone)]
pub struct WsEvent {
    /// Topic this event belongs to (e.g., "tables.news")
    pub topic: String,
    /// The message to send to subscribers
    pub message: ServerMessage,
}

impl WsEvent {
    /// Event for a store change
    pub fn change(change: &ChangeEvent) -> Self {
        match (change.table, change.id) {
            (Some(table), Some(id)) => Self {
                topic: format!("tables.{}", table),
                message: ServerMessage::RecordChanged {
                    table,
                    id,
                    action: change.action,
                },
            },
            _ => Self::reloaded(None),
        }
    }

    /// Event for a dataset replacement
    pub fn reloaded(origin: Option<Uuid>) -> Self {
        Self {
            topic: "system".to_string(),
            message: ServerMessage::StoreReloaded { origin },
        }
    }

    /// Event for a demo store rewritten by another handle
    pub fn storage(event: &StorageEvent) -> Self {
        Self::reloaded(Some(event.origin))
    }

    /// Event for a session heartbeat, expiry or sign-out
    pub fn session(event: &SessionEvent) -> Self {
        let message = match event {
            SessionEvent::Activity {
                user_id,
                expires_at,
                ..
            } => ServerMessage::SessionActivity {
                user_id: *user_id,
                expires_at: *expires_at,
            },
            SessionEvent::Expired { user_id, .. } | SessionEvent::Revoked { user_id, .. } => {
                ServerMessage::SessionExpired { user_id: *user_id }
            }
        };
        Self {
            topic: format!("sessions.{}", event.user_id()),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialize_subscribe() {
        let json = r#"{"type": "subscribe", "topics": ["tables.news", "system"]}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { topics } => {
                assert_eq!(topics.len(), 2);
                assert_eq!(topics[0], "tables.news");
            }
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_client_message_deserialize_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_record_changed_wire_format() {
        let id = Uuid::nil();
        let event = WsEvent::change(&ChangeEvent {
            table: Some(Table::ProductCategories),
            id: Some(id),
            action: ChangeAction::Delete,
        });
        assert_eq!(event.topic, "tables.product_categories");

        let json = serde_json::to_value(&event.message).unwrap();
        assert_eq!(json["type"], "record_changed");
        assert_eq!(json["table"], "product_categories");
        assert_eq!(json["action"], "delete");
    }

    #[test]
    fn test_reload_goes_to_system() {
        let event = WsEvent::change(&ChangeEvent {
            table: None,
            id: None,
            action: ChangeAction::Reload,
        });
        assert_eq!(event.topic, "system");
        assert_eq!(event.message, ServerMessage::StoreReloaded { origin: None });

        let json = serde_json::to_string(&event.message).unwrap();
        assert_eq!(json, r#"{"type":"store_reloaded"}"#);
    }

    #[test]
    fn test_session_event_topic() {
        let user_id = Uuid::new_v4();
        let event = WsEvent::session(&SessionEvent::Expired {
            user_id,
            token: "t".to_string(),
            at: Utc::now(),
        });
        assert_eq!(event.topic, format!("sessions.{}", user_id));
        assert_eq!(event.message, ServerMessage::SessionExpired { user_id });
    }
}
