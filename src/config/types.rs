//! Configuration types for client settings
//!
//! This module defines all configuration structs that are loaded from YAML.
//! Every section has defaults drawn from `config::constants`, so a partial
//! (or empty) file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::core::retry::RetryConfig;
use crate::error::AppError;
use crate::realtime::ReconnectStrategy;

// ============================================================================
// Configuration Structs
// ============================================================================

/// REST and WebSocket endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST origin, e.g. `https://api.example.com` (the `/api/v1` prefix is added)
    #[serde(default = "constants::api_base_url")]
    pub base_url: String,
    /// WebSocket origin, e.g. `wss://api.example.com`
    #[serde(default = "constants::ws_base_url")]
    pub ws_base_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "constants::request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: constants::api_base_url(),
            ws_base_url: constants::ws_base_url(),
            request_timeout_ms: constants::request_timeout_ms(),
        }
    }
}

impl ApiConfig {
    /// Base URL for REST calls, including the `/api/v1` prefix
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            constants::API_V1_PREFIX
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Expiry watcher polling interval in seconds
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Refresh proactively when less than this many seconds remain
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,
    /// Token file; `None` keeps the token in memory only
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_check_interval_secs() -> u64 {
    constants::session_check_interval().as_secs()
}

fn default_refresh_threshold_secs() -> u64 {
    constants::session_refresh_threshold().as_secs()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            token_file: None,
        }
    }
}

/// Realtime channel settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealtimeConfig {
    /// How long to wait before reconnecting a dropped channel
    #[serde(default)]
    pub reconnect: ReconnectStrategy,
    /// Topic the demo binary subscribes to
    #[serde(default)]
    pub topic: Option<String>,
    /// Symbol the demo binary subscribes to
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        // Rule: REST origin must be http(s)
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "api.base_url must start with http:// or https:// (got '{}')",
                self.api.base_url
            )));
        }

        // Rule: WS origin must be ws(s)
        if !(self.api.ws_base_url.starts_with("ws://") || self.api.ws_base_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "api.ws_base_url must start with ws:// or wss:// (got '{}')",
                self.api.ws_base_url
            )));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "api.request_timeout_ms must be > 0".to_string(),
            ));
        }

        // Rule: at least one attempt, and a sane backoff window
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(AppError::Config(format!(
                "retry.initial_delay_ms ({}) must be <= retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            )));
        }

        if self.session.check_interval_secs == 0 {
            return Err(AppError::Config(
                "session.check_interval_secs must be > 0".to_string(),
            ));
        }

        // Rule: the watcher must poll more often than the refresh window,
        // otherwise a token can lapse between two checks
        if self.session.check_interval_secs >= self.session.refresh_threshold_secs {
            return Err(AppError::Config(format!(
                "session.check_interval_secs ({}) must be < session.refresh_threshold_secs ({})",
                self.session.check_interval_secs, self.session.refresh_threshold_secs
            )));
        }

        self.realtime.reconnect.validate()?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
