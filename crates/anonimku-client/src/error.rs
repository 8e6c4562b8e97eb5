use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server responded {status}: {message}")]
    Api { status: u16, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The subscription was dropped; resubscribe and re-fetch.
    #[error("Subscription unavailable: {0}")]
    Unavailable(String),

    /// The server refused a subscription message.
    #[error("Subscription rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }

    /// Worth retrying. Anything the server rejected on its merits is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) | ClientError::WebSocket(_) | ClientError::Unavailable(_) => true,
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Json(_) | ClientError::Rejected(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_errors() {
        let missing = ClientError::Api { status: 404, message: "user not found".into() };
        assert!(missing.is_not_found());
        assert!(!missing.is_transient());

        let busy = ClientError::Api { status: 503, message: "database is busy".into() };
        assert!(busy.is_transient());
        assert!(ClientError::Unavailable("closed".into()).is_transient());
    }
}
