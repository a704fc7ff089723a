//! HTTP client for the feed service's REST endpoints.
//!
//! Every endpoint is a GET with query parameters; the session token travels
//! as `auth=`. A 200 response whose JSON body carries an `error` field is
//! still a failure.

use std::cell::RefCell;

use async_trait::async_trait;
use claw_shared::{try_service_error, ApiError, FeedView, Post, Profile};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// REST operations the sync client depends on.
#[async_trait(?Send)]
pub trait FeedApi {
    async fn fetch_profile(&self, username: &str) -> Result<Profile, ApiError>;

    /// Fetch a server-side feed list. [`FeedView::Live`] has no endpoint
    /// and yields an empty list.
    async fn fetch_feed(&self, view: FeedView) -> Result<Vec<Post>, ApiError>;

    /// Like (`liked == true`) or unlike a post.
    async fn rate(&self, post_id: &str, liked: bool) -> Result<(), ApiError>;

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError>;

    async fn repost(&self, post_id: &str) -> Result<(), ApiError>;

    async fn create_post(&self, content: &str, attachment: Option<&str>) -> Result<(), ApiError>;

    async fn reply(&self, post_id: &str, content: &str) -> Result<(), ApiError>;

    async fn set_following(&self, username: &str, follow: bool) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: RefCell<Option<String>>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            auth: RefCell::new(None),
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth(self, token: Option<String>) -> Self {
        *self.auth.borrow_mut() = token;
        self
    }

    /// Replace the session token, e.g. after login.
    pub fn set_auth(&self, token: impl Into<String>) {
        *self.auth.borrow_mut() = Some(token.into());
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// `endpoint?auth=<token>&k=v...` with every value percent-encoded.
    fn query(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let mut query = endpoint.to_string();
        let mut sep = '?';
        let auth = self.auth.borrow();
        let auth_param = auth.as_deref().map(|token| ("auth", token));
        for (key, value) in auth_param.iter().chain(params.iter()) {
            query.push(sep);
            query.push_str(key);
            query.push('=');
            query.push_str(&urlencoding::encode(value));
            sep = '&';
        }
        query
    }

    async fn get_text(&self, path: &str) -> Result<String, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        if let Some(message) = try_service_error(&text) {
            return Err(ApiError::Rejected(message));
        }
        Ok(text)
    }

    /// Make a GET request and decode the JSON body
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.get_text(path).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make a GET request whose body is irrelevant
    pub async fn get_ok(&self, path: &str) -> Result<(), ApiError> {
        self.get_text(path).await.map(|_| ())
    }
}

fn require_content(content: &str) -> Result<&str, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput("content must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[async_trait(?Send)]
impl FeedApi for ApiClient {
    async fn fetch_profile(&self, username: &str) -> Result<Profile, ApiError> {
        self.get_json(&self.query("profile", &[("name", username)]))
            .await
    }

    async fn fetch_feed(&self, view: FeedView) -> Result<Vec<Post>, ApiError> {
        let Some((endpoint, params)) = view.endpoint() else {
            return Ok(Vec::new());
        };
        self.get_json(&self.query(endpoint, params)).await
    }

    async fn rate(&self, post_id: &str, liked: bool) -> Result<(), ApiError> {
        let rating = if liked { "1" } else { "0" };
        self.get_ok(&self.query("rate", &[("id", post_id), ("rating", rating)]))
            .await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        self.get_ok(&self.query("delete", &[("id", post_id)])).await
    }

    async fn repost(&self, post_id: &str) -> Result<(), ApiError> {
        self.get_ok(&self.query("repost", &[("id", post_id)])).await
    }

    async fn create_post(&self, content: &str, attachment: Option<&str>) -> Result<(), ApiError> {
        let content = require_content(content)?;
        let mut params = vec![("content", content), ("os", "rotur")];
        if let Some(attachment) = attachment.filter(|a| !a.trim().is_empty()) {
            params.push(("attachment", attachment));
        }
        self.get_ok(&self.query("post", &params)).await
    }

    async fn reply(&self, post_id: &str, content: &str) -> Result<(), ApiError> {
        let content = require_content(content)?;
        self.get_ok(&self.query("reply", &[("id", post_id), ("content", content)]))
            .await
    }

    async fn set_following(&self, username: &str, follow: bool) -> Result<(), ApiError> {
        let endpoint = if follow { "follow" } else { "unfollow" };
        self.get_ok(&self.query(endpoint, &[("username", username)]))
            .await
    }
}
