//! WebSocket Change Notifications
//!
//! Pushes record changes and session heartbeats to connected intranet tabs.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Manages all active connections and subscriptions
//! - **Handler**: Authenticates the upgrade and processes client messages
//! - **Forwarder**: Turns store, session and demo-store events into hub events
//! - **Messages**: Defines client and server message formats
//!
//! ## Topics
//!
//! - `tables.*` - Every record change the user may view
//! - `tables.{table}` - One table (e.g., `tables.news`), with its view grant
//!
//! Identity rows are never pushed. Sockets close when their session ends.
//! - `sessions.{user_id}` - Activity and expiry of a user's session
//! - `system` - Dataset reloads
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8080/api/v1/ws?token=${token}`);
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topics: ['tables.news', `sessions.${userId}`]}));
//! };
//! ```

mod forwarder;
mod handler;
mod hub;
mod messages;

pub use forwarder::{start_forwarder, EventSources};
pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionOwner, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage, WsEvent};
