//! Authentication: token persistence, session lifecycle and proactive refresh

pub mod claims;
pub mod models;
pub mod session;
pub mod token_store;
pub mod traits;
pub mod watcher;

pub use claims::Claims;
pub use models::{Credentials, RegisterRequest, UserProfile, MIN_PASSWORD_LEN};
pub use session::{Session, SessionManager};
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredToken, TokenStore};
pub use traits::{Authenticator, TokenSource};
pub use watcher::{check_expiry, expiry_watcher_task, ExpiryCheck, WatcherConfig};
