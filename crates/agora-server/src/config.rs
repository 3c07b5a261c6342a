//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use axum::http::HeaderValue;

use agora_shared::constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_HTTP_PORT};

/// Origins allowed to call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:8000`
    pub http_addr: SocketAddr,

    /// Number of messages returned by `GET /messages`.
    /// Env: `HISTORY_LIMIT`
    /// Default: `50`
    pub history_limit: usize,

    /// CORS origins.
    /// Env: `ALLOWED_ORIGINS` (`*` or a comma-separated list)
    /// Default: `*`
    pub allowed_origins: AllowedOrigins,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], DEFAULT_HTTP_PORT).into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            allowed_origins: AllowedOrigins::Any,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(val) = lookup("HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => tracing::warn!(value = %val, "Invalid HISTORY_LIMIT, using default"),
            }
        }

        if let Some(val) = lookup("ALLOWED_ORIGINS") {
            config.allowed_origins = parse_origins(&val);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Parse `*` or a comma-separated origin list. Invalid entries are skipped.
fn parse_origins(raw: &str) -> AllowedOrigins {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return AllowedOrigins::Any;
    }

    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid origin in ALLOWED_ORIGINS");
                None
            }
        })
        .collect::<Vec<_>>();

    if origins.is_empty() {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8000).into());
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(|key| match key {
            "HTTP_ADDR" => Some("0.0.0.0:9000".into()),
            "HISTORY_LIMIT" => Some("10".into()),
            "ALLOWED_ORIGINS" => Some("http://localhost:5173, http://127.0.0.1:5173".into()),
            _ => None,
        });
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 9000).into());
        assert_eq!(config.history_limit, 10);
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec![
                HeaderValue::from_static("http://localhost:5173"),
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ])
        );
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::from_lookup(|key| match key {
            "HTTP_ADDR" => Some("localhost".into()),
            "HISTORY_LIMIT" => Some("0".into()),
            "ALLOWED_ORIGINS" => Some(" * ".into()),
            _ => None,
        });
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8000).into());
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
    }
}
