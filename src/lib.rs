//! Market Pulse client
//!
//! Authenticated real-time pipeline for the market-sentiment backend:
//! - Token persistence and session lifecycle with proactive refresh
//! - REST gateway with bounded retry and 401-triggered refresh
//! - Reconnecting WebSocket channel with typed message dispatch

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod realtime;

pub use error::{AppError, ClientError, ClientResult};
