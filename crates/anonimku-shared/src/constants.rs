use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "AnonimKu";

/// Minimum number of phone characters after an optional leading `+`
pub const MIN_PHONE_LEN: usize = 8;

/// Maximum display name length in characters
pub const MAX_NAME_LEN: usize = 64;

/// Default maximum message length in characters
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

/// How often a searching client asks for a match
pub const SEARCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a client keeps searching before giving up
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default presence lease: a user not seen for this long is treated as offline
pub const DEFAULT_PRESENCE_TTL_SECS: i64 = 90;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
