//! Realtime socket protocol.
//!
//! Every frame is a JSON object `{"cmd": <kind>, "val": <payload>}`.
//! Decoding happens in two steps so an unknown kind can be told apart
//! from a malformed frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::Post;

/// Undecoded frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub cmd: String,
    #[serde(default)]
    pub val: Value,
}

/// Payload of `update_post`: set `key` on post `id` to `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostPatch {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowerCount {
    pub username: String,
    pub followers: u64,
}

/// Push events understood by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Ping,
    Handshake,
    /// Full replacement of the feed.
    Posts(Vec<Post>),
    NewPost(Post),
    UpdatePost(PostPatch),
    DeletePost(PostRef),
    Followers(FollowerCount),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Ping => "ping",
            ServerEvent::Handshake => "handshake",
            ServerEvent::Posts(_) => "posts",
            ServerEvent::NewPost(_) => "new_post",
            ServerEvent::UpdatePost(_) => "update_post",
            ServerEvent::DeletePost(_) => "delete_post",
            ServerEvent::Followers(_) => "followers",
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Self::decode_reporting(text, |_| {})
    }

    /// Decode a text frame, handing every record dropped from a `posts`
    /// batch to `on_skipped`. One bad record never costs the rest of the
    /// batch.
    pub fn decode_reporting(
        text: &str,
        on_skipped: impl FnMut(ProtocolError),
    ) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        Self::from_frame(frame, on_skipped)
    }

    pub fn from_frame(
        frame: Frame,
        mut on_skipped: impl FnMut(ProtocolError),
    ) -> Result<Self, ProtocolError> {
        fn payload<T: serde::de::DeserializeOwned>(
            kind: &str,
            val: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(val).map_err(|source| ProtocolError::BadPayload {
                kind: kind.to_string(),
                source,
            })
        }

        let Frame { cmd, val } = frame;
        let event = match cmd.as_str() {
            "ping" => ServerEvent::Ping,
            "handshake" => ServerEvent::Handshake,
            "posts" => {
                let records: Vec<Value> = payload::<Option<_>>(&cmd, val)?.unwrap_or_default();
                let mut posts = Vec::with_capacity(records.len());
                for record in records {
                    match payload::<Post>(&cmd, record) {
                        Ok(post) => posts.push(post),
                        Err(e) => on_skipped(e),
                    }
                }
                ServerEvent::Posts(posts)
            }
            "new_post" => ServerEvent::NewPost(payload(&cmd, val)?),
            "update_post" => ServerEvent::UpdatePost(payload(&cmd, val)?),
            "delete_post" => ServerEvent::DeletePost(payload(&cmd, val)?),
            "followers" => ServerEvent::Followers(payload(&cmd, val)?),
            _ => return Err(ProtocolError::UnknownKind(cmd)),
        };
        Ok(event)
    }
}

/// Frames the client sends on the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Keepalive; the server ignores it.
    Ping,
}
