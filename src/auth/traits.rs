//! Seams between the session manager and its readers
//!
//! The gateway and the realtime channel never touch the session directly;
//! they go through these traits so the token can be stale or absent at
//! any read without them caring who owns it.

use async_trait::async_trait;

use crate::error::ClientResult;

/// Read access to the current bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token, or `None` when logged out
    async fn access_token(&self) -> Option<String>;
}

/// Token source that can also renew or drop the session
#[async_trait]
pub trait Authenticator: TokenSource {
    /// Refresh the session after `stale` was rejected.
    ///
    /// If another caller already replaced `stale`, the current token is
    /// returned without another round-trip. On failure the session is
    /// cleared before the error is returned.
    async fn refresh_token(&self, stale: &str) -> ClientResult<String>;

    /// Drop the session. Never fails.
    async fn logout(&self);
}
