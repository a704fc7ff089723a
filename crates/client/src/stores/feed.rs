//! Feed store: which posts make up the current feed.
//!
//! The store holds ids only; records live in the [`PostCache`]. A snapshot
//! resolves the ids, orders them newest first, and is reused until the
//! feed or one of its records changes.

use std::ops::Deref;
use std::rc::Rc;

use claw_shared::Post;

use super::posts::PostCache;

/// Immutable, point-in-time view of the feed handed to subscribers.
///
/// Two snapshots taken with no change in between are the same allocation;
/// use [`FeedSnapshot::ptr_eq`] for a cheap change check.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot(Rc<[Rc<Post>]>);

impl FeedSnapshot {
    pub fn ptr_eq(&self, other: &FeedSnapshot) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|p| p.id.as_str()).collect()
    }
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self(Rc::from(Vec::new()))
    }
}

impl Deref for FeedSnapshot {
    type Target = [Rc<Post>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct FeedStore {
    ids: Vec<String>,
    cached: Option<FeedSnapshot>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the whole feed for `ids`, dropping duplicates.
    pub fn replace(&mut self, ids: impl IntoIterator<Item = String>) {
        self.ids.clear();
        for id in ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
        self.invalidate();
    }

    /// Add `id` to the feed. Returns false if it was already present.
    pub fn append(&mut self, id: String) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        self.invalidate();
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        let removed = self.ids.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Ids in the order they entered the feed.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Forget the cached snapshot so the next read rebuilds it.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn snapshot(&mut self, posts: &PostCache) -> FeedSnapshot {
        if let Some(snapshot) = &self.cached {
            return snapshot.clone();
        }

        let mut records: Vec<Rc<Post>> = self.ids.iter().filter_map(|id| posts.get(id)).collect();
        // Stable sort keeps arrival order for equal timestamps.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let snapshot = FeedSnapshot(Rc::from(records));
        self.cached = Some(snapshot.clone());
        snapshot
    }
}
