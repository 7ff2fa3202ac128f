//! Reconnect delay policy for the realtime channel

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::error::AppError;

/// Delay before reconnecting a dropped channel.
///
/// There is no attempt limit: a live channel keeps reconnecting until it
/// is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectStrategy {
    /// Same delay every time
    Fixed {
        #[serde(default = "constants::ws_reconnect_delay_ms")]
        delay_ms: u64,
    },
    /// Doubling delay, capped
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
    },
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        ReconnectStrategy::Fixed {
            delay_ms: constants::ws_reconnect_delay_ms(),
        }
    }
}

impl ReconnectStrategy {
    /// Delay before reconnect number `retry` (0 = first reconnect after a drop)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            ReconnectStrategy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            ReconnectStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
            } => {
                let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
                Duration::from_millis(initial_delay_ms.saturating_mul(factor).min(max_delay_ms))
            }
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match *self {
            ReconnectStrategy::Fixed { delay_ms } if delay_ms == 0 => Err(AppError::Config(
                "realtime.reconnect.delay_ms must be greater than 0".into(),
            )),
            ReconnectStrategy::Exponential {
                initial_delay_ms, ..
            } if initial_delay_ms == 0 => Err(AppError::Config(
                "realtime.reconnect.initial_delay_ms must be greater than 0".into(),
            )),
            ReconnectStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
            } if initial_delay_ms > max_delay_ms => Err(AppError::Config(format!(
                "realtime.reconnect.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                initial_delay_ms, max_delay_ms
            ))),
            _ => Ok(()),
        }
    }
}
