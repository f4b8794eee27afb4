//! Background task feeding store, session and demo-store events into the hub
//!
//! Events are delivered one at a time from this task, so every connection
//! sees them in the order the sources produced them.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::hub::ConnectionHub;
use super::messages::WsEvent;
use crate::auth::SessionEvent;
use crate::storage::{ChangeEvent, StorageSubscription};

/// Event sources watched by the forwarder
pub struct EventSources {
    pub changes: broadcast::Receiver<ChangeEvent>,
    pub sessions: broadcast::Receiver<SessionEvent>,
    /// Writes made by other handles of the demo store
    pub local: Option<StorageSubscription>,
}

/// Start forwarding until every source is closed
pub fn start_forwarder(hub: Arc<ConnectionHub>, sources: EventSources) -> JoinHandle<()> {
    tokio::spawn(async move {
        let EventSources {
            mut changes,
            mut sessions,
            mut local,
        } = sources;
        let mut changes_open = true;
        let mut sessions_open = true;

        loop {
            tokio::select! {
                event = changes.recv(), if changes_open => match event {
                    Ok(change) => {
                        hub.broadcast(&WsEvent::change(&change)).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change forwarder lagged, asking clients to reload");
                        hub.broadcast(&WsEvent::reloaded(None)).await;
                    }
                    Err(RecvError::Closed) => changes_open = false,
                },
                event = sessions.recv(), if sessions_open => match event {
                    Ok(session) => forward_session(&hub, &session).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Session forwarder lagged");
                    }
                    Err(RecvError::Closed) => sessions_open = false,
                },
                event = next_storage_event(&mut local), if local.is_some() => match event {
                    Some(storage) => {
                        tracing::debug!(origin = %storage.origin, revision = storage.revision, "Demo store rewritten elsewhere");
                        hub.broadcast(&WsEvent::storage(&storage)).await;
                    }
                    None => local = None,
                },
                else => break,
            }
        }

        tracing::debug!("Event forwarder stopped");
    })
}

/// Close sockets of an ended session, then tell the user's other tabs
///
/// A sign-out only ends one token, so it is not announced to the others.
async fn forward_session(hub: &ConnectionHub, event: &SessionEvent) {
    let ws_event = WsEvent::session(event);
    if let Some(token) = event.ended_token() {
        hub.close_session(token, ws_event.message.clone()).await;
    }
    if !matches!(event, SessionEvent::Revoked { .. }) {
        hub.broadcast(&ws_event).await;
    }
}

async fn next_storage_event(
    local: &mut Option<StorageSubscription>,
) -> Option<crate::storage::StorageEvent> {
    match local {
        Some(subscription) => subscription.recv().await,
        None => None,
    }
}
