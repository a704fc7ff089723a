//! Post cache: the single owner of every post record the client has seen.
//!
//! Records are held behind `Rc` so feed snapshots can share them. Mutation
//! goes through `Rc::make_mut`, which copies a record that a snapshot still
//! holds, leaving earlier snapshots untouched.

use std::collections::HashMap;
use std::rc::Rc;

use claw_shared::{PatchError, Post};
use serde_json::Value;

#[derive(Debug, Default, Clone)]
pub struct PostCache {
    posts: HashMap<String, Rc<Post>>,
}

impl PostCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record keyed by `post.id`.
    pub fn upsert(&mut self, post: Post) {
        self.posts.insert(post.id.clone(), Rc::new(post));
    }

    pub fn get(&self, id: &str) -> Option<Rc<Post>> {
        self.posts.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.posts.contains_key(id)
    }

    /// Set one field of a cached post.
    ///
    /// Returns `Ok(false)` when the post is not cached; the patch is dropped.
    pub fn patch_field(&mut self, id: &str, key: &str, value: Value) -> Result<bool, PatchError> {
        let Some(post) = self.posts.get_mut(id) else {
            return Ok(false);
        };
        Rc::make_mut(post).apply_field(key, value)?;
        Ok(true)
    }

    pub fn remove(&mut self, id: &str) -> Option<Rc<Post>> {
        self.posts.remove(id)
    }

    /// Run `f` on every cached record that is or embeds `post_id`, returning
    /// the ids of the records `f` reported as changed.
    pub fn update_referencing(
        &mut self,
        post_id: &str,
        mut f: impl FnMut(&mut Post) -> bool,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (id, post) in self.posts.iter_mut() {
            if post.references(post_id) && f(Rc::make_mut(post)) {
                changed.push(id.clone());
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
