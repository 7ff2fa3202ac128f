//! Token persistence
//!
//! The store is a passive surface: only the session manager writes to it.
//! Values are kept under fixed key names (`access_token`, `token_expiry`,
//! `user_id`) so a restarted client can pick the session back up.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::auth::claims::Claims;
use crate::error::Result;

/// What a store persists for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    /// Expiry as unix seconds
    pub token_expiry: i64,
    pub user_id: String,
}

impl StoredToken {
    pub fn new(access_token: &str, claims: &Claims) -> Self {
        Self {
            access_token: access_token.to_string(),
            token_expiry: claims.expires_at.timestamp(),
            user_id: claims.subject.clone(),
        }
    }
}

/// Persistence surface for the current token
pub trait TokenStore: Send + Sync {
    /// Read the persisted token, if any. Unreadable state reads as `None`.
    fn load(&self) -> Option<StoredToken>;

    fn save(&self, token: &StoredToken) -> Result<()>;

    /// Remove everything. Must not fail.
    fn clear(&self);
}

/// In-memory store; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredToken> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.clone());
        Ok(())
    }

    // A panic elsewhere must not leave a token behind after logout
    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<StoredToken> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token file");
                None
            }
        }
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(token)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove token file");
            }
        }
    }
}
