//! Realtime connection to the feed service.
//!
//! ```text
//!   socialws endpoint
//!         │  text frames {"cmd": .., "val": ..}
//!         ▼
//!  ┌───────────────────┐   keepalive {"cmd":"ping"} every 30s
//!  │ ConnectionManager │   reconnect with capped exponential backoff
//!  └───────────────────┘
//!         │  on_frame(&str)
//!         ▼
//!  FeedSession::handle_frame → SyncState → NotificationBus → listeners
//! ```

mod connection;
mod manager;

#[cfg(test)]
pub(crate) mod test_server;

pub use connection::{ConnectionState, ReconnectConfig};
pub use manager::ConnectionManager;
