//! Canonical client-side state and the push-event handlers that mutate it.
//!
//! Every handler reports whether the feed snapshot changed so the caller
//! can notify subscribers exactly once per event.

use claw_shared::{FollowerCount, Post, PostPatch, PostRef, Profile, ServerEvent};

use crate::stores::{FeedSnapshot, FeedStore, PostCache, ProfileCache};

#[derive(Debug, Default)]
pub struct SyncState {
    pub(crate) posts: PostCache,
    pub(crate) profiles: ProfileCache,
    pub(crate) feed: FeedStore,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> &PostCache {
        &self.posts
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    pub fn feed(&self) -> &FeedStore {
        &self.feed
    }

    pub fn snapshot(&mut self) -> FeedSnapshot {
        self.feed.snapshot(&self.posts)
    }

    /// Apply one push event. Returns true if the feed snapshot changed.
    pub fn apply(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Ping | ServerEvent::Handshake => false,
            ServerEvent::Posts(posts) => {
                self.replace_feed(posts);
                true
            }
            ServerEvent::NewPost(post) => self.add_post(post),
            ServerEvent::UpdatePost(patch) => self.patch_post(patch),
            ServerEvent::DeletePost(PostRef { id }) => self.remove_post(&id),
            ServerEvent::Followers(FollowerCount { username, followers }) => {
                if !self.profiles.set_followers(&username, followers) {
                    crate::log_debug!("Dropping follower count for uncached profile {}", username);
                }
                false
            }
        }
    }

    /// Make `posts` the whole feed, caching every record.
    pub fn replace_feed(&mut self, posts: Vec<Post>) {
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        for post in posts {
            self.posts.upsert(post);
        }
        self.feed.replace(ids);
    }

    /// Cache `post` and append it to the feed.
    pub fn add_post(&mut self, post: Post) -> bool {
        let id = post.id.clone();
        self.posts.upsert(post);
        if !self.feed.append(id) {
            // Already in the feed; the record itself was replaced.
            self.feed.invalidate();
        }
        true
    }

    /// Set one field of a cached post. Patches for uncached posts and
    /// patches that fail to apply are dropped.
    pub fn patch_post(&mut self, patch: PostPatch) -> bool {
        let PostPatch { id, key, data } = patch;
        match self.posts.patch_field(&id, &key, data) {
            Ok(true) => self.touch(&id),
            Ok(false) => {
                crate::log_debug!("Dropping update_post for uncached post {}", id);
                false
            }
            Err(e) => {
                crate::log_warn!("Dropping update_post for {}: {}", id, e);
                false
            }
        }
    }

    /// Remove a post from the cache and the feed.
    pub fn remove_post(&mut self, id: &str) -> bool {
        let cached = self.posts.remove(id).is_some();
        let listed = self.feed.remove(id);
        cached || listed
    }

    pub fn cache_profile(&mut self, username: &str, profile: Profile) {
        self.profiles.insert(username, profile);
    }

    /// Record a follow or unfollow the server accepted. Returns false if
    /// the profile is not cached.
    pub fn set_followed(&mut self, username: &str, followed: bool) -> bool {
        self.profiles.set_followed(username, followed)
    }

    /// Invalidate the snapshot if `id` is part of the feed. Returns whether
    /// it was.
    pub(crate) fn touch(&mut self, id: &str) -> bool {
        if self.feed.contains(id) {
            self.feed.invalidate();
            true
        } else {
            false
        }
    }
}
