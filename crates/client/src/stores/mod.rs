//! Entity caches and the feed store.
//!
//! The caches own every post and profile record. The feed store only
//! references posts by id, so a cache mutation shows up in every view
//! of the same post.

pub mod feed;
pub mod posts;
pub mod profile;

pub use feed::{FeedSnapshot, FeedStore};
pub use posts::PostCache;
pub use profile::ProfileCache;
