//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::ReconnectConfig;

pub const DEFAULT_WS_URL: &str = "wss://socialws.rotur.dev";
pub const DEFAULT_API_URL: &str = "https://api.rotur.dev";
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Realtime endpoint the connection manager dials.
    pub ws_url: String,
    /// Base URL for REST requests.
    pub api_url: String,
    /// Keepalive period while the socket is open.
    pub ping_interval: Duration,
    pub reconnect: ReconnectConfig,
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: ReconnectConfig::default(),
            auth_token: None,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from the environment.
    ///
    /// Environment variables:
    /// - `CLAW_WS_URL`: realtime endpoint (default: `wss://socialws.rotur.dev`)
    /// - `CLAW_API_URL`: REST base URL (default: `https://api.rotur.dev`)
    /// - `CLAW_PING_INTERVAL_SECS`: keepalive period in seconds (default: 30)
    /// - `CLAW_AUTH_TOKEN`: session token for authenticated endpoints
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ws_url) = lookup("CLAW_WS_URL") {
            match url::Url::parse(&ws_url) {
                Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => config.ws_url = ws_url,
                _ => crate::log_warn!("Ignoring CLAW_WS_URL={}: not a ws:// or wss:// URL", ws_url),
            }
        }

        if let Some(api_url) = lookup("CLAW_API_URL") {
            match url::Url::parse(&api_url) {
                Ok(_) => config.api_url = api_url,
                Err(e) => crate::log_warn!("Ignoring CLAW_API_URL={}: {}", api_url, e),
            }
        }

        if let Some(secs) = lookup("CLAW_PING_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.ping_interval = Duration::from_secs(secs),
                _ => crate::log_warn!("Ignoring CLAW_PING_INTERVAL_SECS={}", secs),
            }
        }

        config.auth_token = lookup("CLAW_AUTH_TOKEN").filter(|t| !t.trim().is_empty());
        config
    }
}
