//! Proactive token refresh
//!
//! Polls the session on a fixed interval and refreshes the access token
//! once its remaining lifetime drops below the threshold.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::auth::session::{Session, SessionManager};
use crate::auth::traits::Authenticator;
use crate::config::SessionConfig;

/// Expiry watcher settings
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How often the token is inspected
    pub check_interval: Duration,
    /// Refresh when less than this is left
    pub refresh_threshold: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(300),
        }
    }
}

impl From<&SessionConfig> for WatcherConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.check_interval_secs),
            refresh_threshold: Duration::from_secs(config.refresh_threshold_secs),
        }
    }
}

/// Outcome of one expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// Nobody is logged in
    NoSession,
    /// Enough lifetime left
    Healthy(Duration),
    /// Below threshold; carries the token to refresh
    RefreshDue(String),
    /// Already lapsed; the session must be dropped
    Expired,
}

/// Classify `session` at `now`
pub fn check_expiry(session: Option<&Session>, now: DateTime<Utc>, threshold: Duration) -> ExpiryCheck {
    let Some(session) = session else {
        return ExpiryCheck::NoSession;
    };

    if session.claims.is_expired(now) {
        return ExpiryCheck::Expired;
    }

    let remaining = session.claims.remaining(now);
    if remaining < threshold {
        ExpiryCheck::RefreshDue(session.access_token.clone())
    } else {
        ExpiryCheck::Healthy(remaining)
    }
}

/// Task that keeps the session fresh until `shutdown_rx` fires.
///
/// The first check runs immediately.
pub async fn expiry_watcher_task(
    manager: Arc<SessionManager>,
    config: WatcherConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    // interval() panics on a zero period
    let mut ticker = tokio::time::interval(config.check_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        check_interval_secs = config.check_interval.as_secs(),
        refresh_threshold_secs = config.refresh_threshold.as_secs(),
        "Expiry watcher started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_check(&manager, config.refresh_threshold).await;
            },
            _ = shutdown_rx.recv() => {
                info!("Expiry watcher shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn run_check(manager: &SessionManager, threshold: Duration) {
    let session = manager.session().await;
    match check_expiry(session.as_ref(), Utc::now(), threshold) {
        ExpiryCheck::NoSession => {}
        ExpiryCheck::Healthy(remaining) => {
            debug!(remaining_secs = remaining.as_secs(), "Access token healthy");
        }
        ExpiryCheck::RefreshDue(token) => {
            info!("[SESSION] Access token close to expiry, refreshing");
            if let Err(e) = manager.refresh_token(&token).await {
                error!(error = %e, "[SESSION] Proactive refresh failed");
            }
        }
        ExpiryCheck::Expired => {
            warn!("[SESSION] Access token expired before refresh, logging out");
            manager.logout().await;
        }
    }
}
