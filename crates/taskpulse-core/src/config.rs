//! Server and client configuration.
//!
//! Both configs start from built-in defaults and can be overridden from
//! `TASKPULSE_*` environment variables. CLI flags are layered on top by the
//! binary.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::event::UserId;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3030;

/// Outbound frames buffered per connection before sends start failing.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default WebSocket endpoint for clients.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3030/ws";

/// Fixed delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Fan-out server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Load from `TASKPULSE_HOST`, `TASKPULSE_PORT` and
    /// `TASKPULSE_CHANNEL_CAPACITY`, falling back to defaults.
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FeedResult<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("TASKPULSE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "TASKPULSE_PORT")? {
            config.port = port;
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "TASKPULSE_CHANNEL_CAPACITY")? {
            if capacity == 0 {
                return Err(FeedError::config("TASKPULSE_CHANNEL_CAPACITY must be at least 1"));
            }
            config.channel_capacity = capacity;
        }
        Ok(config)
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    /// Identity announced in the auth handshake, if known.
    pub user_id: Option<UserId>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            user_id: None,
        }
    }
}

impl ClientConfig {
    /// Load from `TASKPULSE_WS_URL`, `TASKPULSE_RECONNECT_MS` and
    /// `TASKPULSE_USER_ID`, falling back to defaults.
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FeedResult<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("TASKPULSE_WS_URL") {
            config.url = url;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASKPULSE_RECONNECT_MS")? {
            if ms == 0 {
                return Err(FeedError::config("TASKPULSE_RECONNECT_MS must be at least 1"));
            }
            config.reconnect_delay = Duration::from_millis(ms);
        }
        config.user_id = parse_var(&lookup, "TASKPULSE_USER_ID")?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> FeedResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FeedError::config(format!("invalid value for {}: '{}'", key, raw))),
    }
}
