//! Claw client: realtime feed synchronization for the Claw social service.
//!
//! The crate keeps a local, always-current copy of the feed. A single
//! WebSocket connection delivers push events, which are applied to shared
//! post and profile caches; subscribers receive a fresh feed snapshot after
//! every change. User actions are applied optimistically before the REST
//! request goes out.

pub mod api_client;
pub mod bus;
pub mod config;
pub mod logging;
mod optimistic;
pub mod session;
pub mod stores;
pub mod sync;
pub mod ws;

pub use api_client::{ApiClient, FeedApi};
pub use bus::{NotificationBus, Subscription};
pub use config::ClientConfig;
pub use session::FeedSession;
pub use stores::FeedSnapshot;
pub use sync::SyncState;
pub use ws::{ConnectionManager, ConnectionState, ReconnectConfig};
