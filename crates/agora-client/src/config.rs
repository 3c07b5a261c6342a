//! Client configuration loaded from environment variables.
//!
//! Addresses are fixed for the lifetime of the process; every setting has a
//! default that points at a server on the local machine.

use std::time::Duration;

use agora_shared::constants::{
    DEFAULT_API_URL, DEFAULT_WS_URL, HISTORY_TIMEOUT_MS, MESSAGES_PATH, RECONNECT_DELAY_MS,
};

/// Capacity of the room event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the HTTP API.
    /// Env: `AGORA_API_URL`
    /// Default: `http://127.0.0.1:8000`
    pub api_url: String,

    /// Address of the live channel.
    /// Env: `AGORA_WS_URL`
    /// Default: `ws://127.0.0.1:8000/ws/chat`
    pub ws_url: String,

    /// Timeout of the one-shot history request.
    /// Env: `AGORA_HISTORY_TIMEOUT_MS`
    /// Default: 10 s
    pub history_timeout: Duration,

    /// Delay before reopening a dropped live channel.
    /// Env: `AGORA_RECONNECT_DELAY_MS`
    /// Default: 3 s
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            history_timeout: Duration::from_millis(HISTORY_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("AGORA_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }

        if let Some(url) = lookup("AGORA_WS_URL").filter(|v| !v.trim().is_empty()) {
            config.ws_url = url.trim().to_string();
        }

        if let Some(val) = lookup("AGORA_HISTORY_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.history_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid AGORA_HISTORY_TIMEOUT_MS, using default"
                ),
            }
        }

        if let Some(val) = lookup("AGORA_RECONNECT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid AGORA_RECONNECT_DELAY_MS, using default"
                ),
            }
        }

        config
    }

    /// Full URL of the message backlog route.
    pub fn messages_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), MESSAGES_PATH)
    }
}
