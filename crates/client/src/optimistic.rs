//! Speculative edits applied before the server confirms them.
//!
//! Nothing here is rolled back if the matching request fails. The local
//! state stays as edited until a push event overwrites it.
// TODO: roll back optimistic likes/deletes when the request is rejected.

use crate::sync::SyncState;

impl SyncState {
    /// Toggle `user` in the likers of `post_id`: add when `currently_liked`
    /// is false, remove when it is true. Cached reposts embedding the post
    /// are updated too. Returns true if the feed snapshot changed.
    pub fn like_optimistic(&mut self, post_id: &str, user: &str, currently_liked: bool) -> bool {
        let liked = !currently_liked;
        let changed = self
            .posts
            .update_referencing(post_id, |post| post.set_liked(post_id, user, liked));

        let mut feed_changed = false;
        for id in &changed {
            feed_changed |= self.touch(id);
        }
        feed_changed
    }

    /// Remove a post locally ahead of the server's `delete_post` event.
    pub fn delete_optimistic(&mut self, post_id: &str) -> bool {
        self.remove_post(post_id)
    }
}
