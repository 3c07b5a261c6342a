/// Application name
pub const APP_NAME: &str = "Agora";

/// Default base address of the HTTP API
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Default address of the live channel
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/chat";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Route serving the message backlog, oldest first
pub const MESSAGES_PATH: &str = "/messages";

/// Route upgrading to the live channel
pub const LIVE_CHANNEL_PATH: &str = "/ws/chat";

/// Health check route
pub const HEALTH_PATH: &str = "/health";

/// Fixed delay between a dropped live channel and the next reopen attempt
pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Upper bound on the one-shot history request
pub const HISTORY_TIMEOUT_MS: u64 = 10_000;

/// Number of messages the server returns from the backlog route
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Nickname the server substitutes when a frame omits one
pub const ANONYMOUS_NICKNAME: &str = "Anonymous";
