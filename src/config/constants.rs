//! Application-wide constants and configuration defaults
//!
//! This module centralizes all hardcoded values to make them configurable
//! and maintainable. Values can be overridden via environment variables.

use std::time::Duration;

/// REST path prefix shared by every endpoint
pub const API_V1_PREFIX: &str = "/api/v1";

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

// =============================================================================
// Endpoints
// =============================================================================

/// REST API origin (default: `http://localhost:8000`)
///
/// Environment variable: `MARKET_PULSE_API_URL`
pub fn api_base_url() -> String {
    std::env::var("MARKET_PULSE_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

/// WebSocket origin (default: `ws://localhost:8000`)
///
/// Environment variable: `MARKET_PULSE_WS_URL`
pub fn ws_base_url() -> String {
    std::env::var("MARKET_PULSE_WS_URL").unwrap_or_else(|_| "ws://localhost:8000".to_string())
}

/// REST request timeout in milliseconds (default: 10000ms)
///
/// Environment variable: `REQUEST_TIMEOUT_MS`
pub fn request_timeout_ms() -> u64 {
    std::env::var("REQUEST_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000)
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Expiry watcher polling interval (default: 60 seconds)
///
/// Environment variable: `SESSION_CHECK_INTERVAL_SECS`
pub fn session_check_interval() -> Duration {
    let secs = std::env::var("SESSION_CHECK_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);
    Duration::from_secs(secs)
}

/// Remaining token lifetime under which a proactive refresh happens
/// (default: 5 minutes)
///
/// Environment variable: `SESSION_REFRESH_THRESHOLD_SECS`
pub fn session_refresh_threshold() -> Duration {
    let secs = std::env::var("SESSION_REFRESH_THRESHOLD_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

// =============================================================================
// Retry & Reconnect Configuration
// =============================================================================

/// Maximum attempts for idempotent requests (default: 3)
///
/// Environment variable: `MAX_RETRY_ATTEMPTS`
pub fn max_retry_attempts() -> u32 {
    std::env::var("MAX_RETRY_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3)
}

/// Delay before a dropped realtime channel reconnects (default: 5000ms)
///
/// Environment variable: `WS_RECONNECT_DELAY_MS`
pub fn ws_reconnect_delay_ms() -> u64 {
    std::env::var("WS_RECONNECT_DELAY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000)
}

/// Print all configuration values (for startup logs)
pub fn log_configuration() {
    tracing::info!("=== Client Configuration ===");
    tracing::info!("  - API URL: {}", api_base_url());
    tracing::info!("  - WS URL: {}", ws_base_url());
    tracing::info!("  - Request timeout: {}ms", request_timeout_ms());
    tracing::info!("  - Session check interval: {:?}", session_check_interval());
    tracing::info!("  - Refresh threshold: {:?}", session_refresh_threshold());
    tracing::info!("  - Max retry attempts: {}", max_retry_attempts());
    tracing::info!("  - WS reconnect delay: {}ms", ws_reconnect_delay_ms());
    tracing::info!("============================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(env)]
    fn test_default_values() {
        assert_eq!(session_check_interval(), Duration::from_secs(60));
        assert_eq!(session_refresh_threshold(), Duration::from_secs(300));
        assert_eq!(max_retry_attempts(), 3);
        assert_eq!(ws_reconnect_delay_ms(), 5_000);
        assert_eq!(request_timeout_ms(), 10_000);
    }

    #[test]
    #[serial(env)]
    fn test_env_override() {
        std::env::set_var("MAX_RETRY_ATTEMPTS", "5");
        std::env::set_var("MARKET_PULSE_API_URL", "https://api.example.test");

        assert_eq!(max_retry_attempts(), 5);
        assert_eq!(api_base_url(), "https://api.example.test");

        std::env::remove_var("MAX_RETRY_ATTEMPTS");
        std::env::remove_var("MARKET_PULSE_API_URL");
    }

    #[test]
    #[serial(env)]
    fn test_unparseable_env_falls_back() {
        std::env::set_var("WS_RECONNECT_DELAY_MS", "soon");
        assert_eq!(ws_reconnect_delay_ms(), 5_000);
        std::env::remove_var("WS_RECONNECT_DELAY_MS");
    }
}
