//! Shared error types.

use thiserror::Error;

/// Failure of a REST request against the feed service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    /// The service answered 200 with an `{"error": ...}` body.
    #[error("Rejected by service: {0}")]
    Rejected(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Attempt to pull a service error message out of a JSON body.
pub fn try_service_error(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;
    match parsed.get("error")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// An inbound frame that could not be turned into a [`crate::ServerEvent`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
    #[error("bad payload for {kind}: {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A field patch that could not be applied to a cached record.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid value for field {key}: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("field {0} cannot be patched")]
    ImmutableField(String),
}
