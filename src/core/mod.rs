//! Core module - logging, retry/backoff and shared HTTP plumbing
//!
//! Prefer importing from `crate::core`:
//! ```ignore
//! use crate::core::{retry_with_backoff, RetryConfig};
//! ```

pub mod http;
pub mod logging;
pub mod retry;

// Explicit re-exports for logging module
pub use logging::{
    init_logging, init_logging_with_config, redact_url, sanitize, LoggingConfig, SanitizedValue,
    DEFAULT_LOG_LEVEL, SENSITIVE_FIELD_PATTERNS,
};

// Explicit re-exports for retry module
pub use retry::{retry_with_backoff, RetryConfig};
