//! Error types using thiserror
//!
//! `ClientError` is the taxonomy every client component returns.
//! `AppError` wraps it together with configuration and IO failures for
//! the binary and the config loader.

use thiserror::Error;

/// Errors surfaced by the session manager, gateway and realtime channel
#[derive(Error, Debug)]
pub enum ClientError {
    /// Credentials or bearer token rejected by the server (401)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No session is active
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Token could not be decoded
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token refresh was rejected; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Transport-level failure (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Malformed input, rejected locally or by the server (400/422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Server rate limit hit (429)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource missing (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl ClientError {
    /// Transient failures that an idempotent request may retry
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout(_) => true,
            ClientError::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// True for a 401 from the server
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }

    /// Errors that end the session and send the user back to login
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Authentication(_)
                | ClientError::NotAuthenticated
                | ClientError::InvalidToken(_)
                | ClientError::RefreshFailed(_)
        )
    }

    /// Build an error from a non-success HTTP status and its body.
    ///
    /// Understands both FastAPI's `{"detail": ...}` and the
    /// `{"error": {"code", "message", "field"}}` envelope.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = server_message(body);
        match status {
            400 | 422 => ClientError::Validation(message),
            401 => ClientError::Authentication(message),
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound(message),
            429 => ClientError::RateLimited {
                message,
                retry_after_secs,
            },
            _ => ClientError::Server { status, message },
        }
    }

    /// Map a reqwest failure, given the timeout the client was built with
    pub fn from_transport(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(timeout_ms)
        } else if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(e))
    }
}

/// Extract a human-readable reason from an error body
fn server_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no details".to_string();
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return trimmed.to_string();
    };

    if let Some(detail) = value.get("detail") {
        return match detail {
            serde_json::Value::String(s) => s.clone(),
            // 422 bodies carry a list of {loc, msg, type}
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };
    }

    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return message.to_string();
    }

    trimmed.to_string()
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
