//! Shared data models for the claw feed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::PatchError;

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Posts ---

/// A reply attached to a post. Replies never nest and carry no likes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reply {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
}

/// A post as delivered by the feed service.
///
/// A post with `original_post` set is a repost. Its own `likes` and
/// `replies` are not meaningful for display; read them through
/// [`Post::display`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    /// Tag of the client the post was made from.
    #[serde(default, deserialize_with = "null_as_default")]
    pub os: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub replies: Vec<Reply>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub likes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_post: Option<Box<Post>>,
    /// Fields the client does not model, kept so patches are never lost.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn is_repost(&self) -> bool {
        self.original_post.is_some()
    }

    /// The record whose content and engagement should be shown for this post.
    pub fn display(&self) -> &Post {
        self.original_post.as_deref().unwrap_or(self)
    }

    pub fn is_liked_by(&self, username: &str) -> bool {
        self.display().likes.contains(username)
    }

    pub fn like_count(&self) -> usize {
        self.display().likes.len()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Set the field named `key` to `value`.
    ///
    /// Unknown keys land in [`Post::extra`]. The id cannot be rewritten
    /// because caches key records by it.
    pub fn apply_field(&mut self, key: &str, value: Value) -> Result<(), PatchError> {
        fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Result<T, PatchError> {
            serde_json::from_value(value).map_err(|source| PatchError::InvalidValue {
                key: key.to_string(),
                source,
            })
        }

        match key {
            "id" => return Err(PatchError::ImmutableField(key.to_string())),
            "content" => self.content = decode(key, value)?,
            "user" => self.user = decode(key, value)?,
            "timestamp" => self.timestamp = decode(key, value)?,
            "os" => self.os = decode(key, value)?,
            "replies" => {
                self.replies = decode::<Option<Vec<Reply>>>(key, value)?.unwrap_or_default()
            }
            "likes" => {
                self.likes = decode::<Option<BTreeSet<String>>>(key, value)?.unwrap_or_default()
            }
            "attachment" => self.attachment = decode(key, value)?,
            "profile_only" => self.profile_only = decode(key, value)?,
            "premium" => self.premium = decode(key, value)?,
            "original_post" => self.original_post = decode(key, value)?,
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Add or remove `username` from the likers of this post and of the
    /// embedded original when it shares `post_id`. Returns true if anything
    /// changed.
    pub fn set_liked(&mut self, post_id: &str, username: &str, liked: bool) -> bool {
        let mut changed = false;
        if self.id == post_id {
            changed |= if liked {
                self.likes.insert(username.to_string())
            } else {
                self.likes.remove(username)
            };
        }
        if let Some(original) = self.original_post.as_deref_mut() {
            changed |= original.set_liked(post_id, username, liked);
        }
        changed
    }

    /// Whether this record is, or embeds, the post with `post_id`.
    pub fn references(&self, post_id: &str) -> bool {
        self.id == post_id
            || self
                .original_post
                .as_deref()
                .is_some_and(|original| original.references(post_id))
    }
}

// --- Profiles ---

/// A user profile as returned by the profile endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub followers: u64,
    /// Whether the current viewer follows this user.
    #[serde(default, deserialize_with = "null_as_default")]
    pub followed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<Post>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// --- Feed views ---

/// Which server-side list the feed is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedView {
    /// The realtime feed pushed over the socket.
    #[default]
    Live,
    /// Posts from followed users.
    Following,
    /// Most engaged posts of the past week.
    Top,
    /// Most recent posts.
    Latest,
}

impl FeedView {
    /// REST endpoint and fixed query parameters for views that are fetched
    /// rather than pushed. The session token is not part of it.
    pub fn endpoint(&self) -> Option<(&'static str, &'static [(&'static str, &'static str)])> {
        match self {
            FeedView::Live => None,
            FeedView::Following => Some(("following_feed", &[])),
            FeedView::Top => Some(("top_posts", &[("time_period", "168")])),
            FeedView::Latest => Some(("feed", &[("limit", "50"), ("offset", "0")])),
        }
    }
}
