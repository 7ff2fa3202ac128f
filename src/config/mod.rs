//! Configuration module for client settings and YAML loading
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `ApiConfig`, `SessionConfig`, `RealtimeConfig`)
//! - YAML loading functionality (`load_config`)
//! - Defaults with environment variable overrides (`constants`)

pub mod constants;
mod loader;
mod types;

pub use types::{ApiConfig, AppConfig, RealtimeConfig, SessionConfig};

pub use loader::{load_config, load_config_from_str};
