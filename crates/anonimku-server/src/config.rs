//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anonimku_shared::constants::{
    APP_NAME, DEFAULT_HTTP_PORT, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_PRESENCE_TTL_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./anonimku.db`
    pub database_path: PathBuf,

    /// A user whose presence lease is older than this is treated as offline.
    /// Env: `PRESENCE_TTL_SECS`
    /// Default: `90`
    pub presence_ttl: Duration,

    /// How often the presence sweeper runs.
    /// Env: `PRESENCE_SWEEP_SECS`
    /// Default: `30`
    pub presence_sweep_interval: Duration,

    /// Maximum message length in characters.
    /// Env: `MAX_MESSAGE_LEN`
    /// Default: `2000`
    pub max_message_len: usize,

    /// Per-connection buffer of pending change events. A subscriber that
    /// falls this far behind is dropped.
    /// Env: `SUBSCRIBER_BUFFER`
    /// Default: `256`
    pub subscriber_buffer: usize,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"AnonimKu"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./anonimku.db"),
            presence_ttl: Duration::from_secs(DEFAULT_PRESENCE_TTL_SECS as u64),
            presence_sweep_interval: Duration::from_secs(30),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            subscriber_buffer: 256,
            instance_name: APP_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(secs) = positive(&var, "PRESENCE_TTL_SECS") {
            config.presence_ttl = Duration::from_secs(secs as u64);
        }

        if let Some(secs) = positive(&var, "PRESENCE_SWEEP_SECS") {
            config.presence_sweep_interval = Duration::from_secs(secs as u64);
        }

        if let Some(len) = positive(&var, "MAX_MESSAGE_LEN") {
            config.max_message_len = len;
        }

        if let Some(n) = positive(&var, "SUBSCRIBER_BUFFER") {
            config.subscriber_buffer = n;
        }

        if let Some(name) = var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The presence lease as a chrono duration, for timestamp arithmetic.
    pub fn presence_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.presence_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_PRESENCE_TTL_SECS))
    }
}

/// Read a strictly positive integer, warning about anything else.
fn positive(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = var(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.presence_ttl, Duration::from_secs(90));
        assert_eq!(config.presence_sweep_interval, Duration::from_secs(30));
        assert_eq!(config.max_message_len, 2000);
        assert_eq!(config.subscriber_buffer, 256);
        assert_eq!(config.instance_name, "AnonimKu");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/chat.db"),
            ("PRESENCE_TTL_SECS", "15"),
            ("MAX_MESSAGE_LEN", "500"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.presence_ttl, Duration::from_secs(15));
        assert_eq!(config.presence_ttl_chrono(), chrono::Duration::seconds(15));
        assert_eq!(config.max_message_len, 500);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("HTTP_ADDR", "not an address"),
            ("PRESENCE_TTL_SECS", "-5"),
            ("SUBSCRIBER_BUFFER", "0"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.presence_ttl, Duration::from_secs(90));
        assert_eq!(config.subscriber_buffer, 256);
    }
}
