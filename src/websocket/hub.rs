//! WebSocket Connection Hub
//!
//! Manages all WebSocket connections, subscriptions, and message broadcasting.
//! Every connection belongs to an authenticated session. The owner's view
//! grants decide which `tables.<table>` changes reach it and its user id
//! decides which `sessions.<user_id>` topics it may join.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::{ServerMessage, WsEvent};
use crate::auth::Principal;
use crate::storage::{Action, Section, Table};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

type Connections = Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>;
type Subscriptions = Arc<RwLock<HashMap<String, HashSet<ConnectionId>>>>;

/// Manages all WebSocket connections and subscriptions
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: Connections,
    /// Topic subscriptions: Topic → Set of ConnectionIds
    subscriptions: Subscriptions,
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOwner {
    pub user_id: Uuid,
    pub is_admin: bool,
    /// Token the socket was opened with
    pub session_token: String,
    /// Sections the user holds the view grant for
    pub viewable: HashSet<Section>,
}

impl ConnectionOwner {
    pub fn from_principal(principal: &Principal, session_token: impl Into<String>) -> Self {
        Self {
            user_id: principal.user_id,
            is_admin: principal.is_admin(),
            session_token: session_token.into(),
            viewable: Section::all()
                .iter()
                .copied()
                .filter(|section| principal.can(*section, Action::View))
                .collect(),
        }
    }

    /// Whether changes to `table` may be pushed to this owner
    ///
    /// Identities hold password hashes and are never pushed.
    pub fn can_view(&self, table: Table) -> bool {
        if table == Table::Identities {
            return false;
        }
        self.is_admin || self.viewable.contains(&Section::for_table(table))
    }
}

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    pub owner: ConnectionOwner,
    /// Topics this connection is subscribed to
    pub subscriptions: HashSet<String>,
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Fails once the connection limit has been reached.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
        owner: ConnectionOwner,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        tracing::info!(connection_id = %id, user_id = %owner.user_id, "WebSocket connected");
        connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                owner,
                subscriptions: HashSet::new(),
            },
        );

        Ok(id)
    }

    /// Unregister a connection and clean up its subscriptions
    ///
    /// Dropping the handle closes its channel, which ends the socket's send loop.
    pub async fn unregister(&self, id: &str) {
        let handle = self.connections.write().await.remove(id);

        if let Some(handle) = handle {
            let mut subs = self.subscriptions.write().await;
            for topic in handle.subscriptions {
                if let Some(subscribers) = subs.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subs.remove(&topic);
                    }
                }
            }
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
    }

    /// Send `notice` to every connection opened with `token`, then drop them
    ///
    /// Returns how many connections were closed.
    pub async fn close_session(&self, token: &str, notice: ServerMessage) -> usize {
        let ids: Vec<ConnectionId> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, handle)| handle.owner.session_token == token)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            let _ = self.send_to(id, notice.clone()).await;
            self.unregister(id).await;
        }

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Closed sockets of an ended session");
        }
        ids.len()
    }

    /// Subscribe a connection to topics
    ///
    /// Returns the topics actually joined; invalid or forbidden ones are skipped.
    pub async fn subscribe(&self, id: &str, topics: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        let mut subscribed = Vec::new();

        for topic in topics {
            if !is_allowed_topic(&topic, &handle.owner) {
                tracing::warn!(connection_id = %id, topic = %topic, "Topic refused");
                continue;
            }

            handle.subscriptions.insert(topic.clone());
            subs.entry(topic.clone()).or_default().insert(id.to_string());
            subscribed.push(topic);
        }

        tracing::debug!(connection_id = %id, topics = ?subscribed, "Subscribed to topics");
        Ok(subscribed)
    }

    /// Unsubscribe a connection from topics
    pub async fn unsubscribe(
        &self,
        id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        let mut unsubscribed = Vec::new();

        for topic in topics {
            if handle.subscriptions.remove(&topic) {
                if let Some(subscribers) = subs.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subs.remove(&topic);
                    }
                }
                unsubscribed.push(topic);
            }
        }

        tracing::debug!(connection_id = %id, topics = ?unsubscribed, "Unsubscribed from topics");
        Ok(unsubscribed)
    }

    /// Deliver an event to all subscribers of its topic
    ///
    /// Messages are queued before this returns, so events broadcast one after
    /// another reach each connection in that order.
    pub async fn broadcast(&self, event: &WsEvent) -> usize {
        let subs = self.subscriptions.read().await;
        let connections = self.connections.read().await;

        let mut ids: HashSet<&ConnectionId> = HashSet::new();
        if let Some(direct) = subs.get(&event.topic) {
            ids.extend(direct);
        }
        // "tables.*" matches "tables.news"
        if let Some((prefix, _)) = event.topic.split_once('.') {
            if let Some(wildcard) = subs.get(&format!("{}.*", prefix)) {
                ids.extend(wildcard);
            }
        }

        let table = event
            .topic
            .strip_prefix("tables.")
            .and_then(|t| t.parse::<Table>().ok());

        let mut sent = 0;
        for id in ids {
            let Some(handle) = connections.get(id) else { continue };
            if let Some(table) = table {
                if !handle.owner.can_view(table) {
                    continue;
                }
            }
            if handle.sender.send(event.message.clone()).is_ok() {
                sent += 1;
            }
        }

        if sent > 0 {
            tracing::trace!(topic = %event.topic, subscribers = sent, "Broadcast event");
        }
        sent
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(message)
            .map_err(|_| HubError::SendFailed)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

/// Valid topics:
/// - `tables.*` (filtered per event by the owner's view grants)
/// - `tables.<table>` when the owner may view that table
/// - `sessions.<user_id>` (own user; admins may watch anyone)
/// - `system`
fn is_allowed_topic(topic: &str, owner: &ConnectionOwner) -> bool {
    if topic == "system" || topic == "tables.*" {
        return true;
    }
    if let Some(table) = topic.strip_prefix("tables.") {
        return match table.parse::<Table>() {
            Ok(table) => owner.can_view(table),
            Err(_) => false,
        };
    }
    if let Some(user) = topic.strip_prefix("sessions.") {
        return match user.parse::<Uuid>() {
            Ok(user_id) => owner.is_admin || user_id == owner.user_id,
            Err(_) => false,
        };
    }
    false
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}
