//! Auth session manager
//!
//! Owns the one live `Session` of the client. Login, refresh and restore
//! populate it; logout and failed refreshes destroy it. The token store
//! is kept in step with every change.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::auth::claims::Claims;
use crate::auth::models::{
    validate_email, validate_password, Credentials, LoginResponse, MessageResponse,
    RegisterRequest, TokenResponse, UserProfile,
};
use crate::auth::token_store::{StoredToken, TokenStore};
use crate::auth::traits::{Authenticator, TokenSource};
use crate::config::ApiConfig;
use crate::core::http::{build_http_client, read_json};
use crate::core::logging::sanitize;
use crate::error::{ClientError, ClientResult};

/// The authenticated session
#[derive(Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub claims: Claims,
    pub user: Option<UserProfile>,
}

impl Session {
    /// Decode `access_token` into a session
    pub fn from_token(access_token: String, user: Option<UserProfile>) -> ClientResult<Self> {
        let claims = Claims::decode(&access_token)?;
        Ok(Self {
            access_token,
            claims,
            user,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        !self.claims.is_expired(Utc::now())
    }

    pub fn user_id(&self) -> &str {
        &self.claims.subject
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &sanitize(&self.access_token))
            .field("claims", &self.claims)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    /// Bumped on every logout; a refresh started under an older epoch
    /// must not install its result
    epoch: u64,
}

/// Login, logout, refresh and password flows against `/auth`
pub struct SessionManager {
    api_root: String,
    http_client: reqwest::Client,
    timeout_ms: u64,
    store: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
    /// Serialises refreshes so concurrent triggers collapse into one
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(api: &ApiConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            api_root: api.api_root(),
            http_client: build_http_client(api.request_timeout()),
            timeout_ms: api.request_timeout_ms,
            store,
            state: RwLock::new(SessionState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// Snapshot of the current session
    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.current.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .await
            .current
            .as_ref()
            .map(Session::is_authenticated)
            .unwrap_or(false)
    }

    /// Pick up a persisted token (page load).
    ///
    /// Malformed or expired tokens are cleared. Returns whether a session
    /// is now active.
    pub async fn restore(&self) -> bool {
        let Some(stored) = self.store.load() else {
            return false;
        };

        match Session::from_token(stored.access_token, None) {
            Ok(session) if session.is_authenticated() => {
                tracing::info!(user_id = %session.user_id(), "Session restored from token store");
                self.state.write().await.current = Some(session);
                true
            }
            Ok(_) => {
                tracing::info!("Persisted token has expired, clearing it");
                self.logout().await;
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted token is malformed, clearing it");
                self.logout().await;
                false
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// On failure the current session is left untouched and the server's
    /// reason is surfaced.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<Session> {
        credentials.validate()?;

        tracing::info!(username = %credentials.username, "Logging in");
        let response = self
            .http_client
            .post(self.url("/auth/login"))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;

        let body: LoginResponse = match read_json(response, self.timeout_ms).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(username = %credentials.username, error = %e, "Login rejected");
                return Err(e);
            }
        };

        let session = Session::from_token(body.access_token, body.user)?;
        self.install(session.clone(), None).await;
        tracing::info!(
            user_id = %session.user_id(),
            expires_at = %session.claims.expires_at,
            "Login successful"
        );
        Ok(session)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<UserProfile> {
        request.validate()?;

        let response = self
            .http_client
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;

        let user: UserProfile = read_json(response, self.timeout_ms).await?;
        tracing::info!(username = %user.username, "Account registered");
        Ok(user)
    }

    /// Clear the token store and the in-memory session. Never fails.
    pub async fn logout(&self) {
        let previous = {
            let mut state = self.state.write().await;
            state.epoch += 1;
            // Cleared under the lock so an in-flight install cannot interleave
            self.store.clear();
            state.current.take()
        };
        if let Some(session) = previous {
            tracing::info!(user_id = %session.user_id(), "Logged out");
        }
    }

    /// Exchange the current token for a new one.
    ///
    /// Any failure logs the user out.
    pub async fn refresh(&self) -> ClientResult<String> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> ClientResult<String> {
        let (current, epoch) = {
            let state = self.state.read().await;
            match &state.current {
                Some(session) => (session.access_token.clone(), state.epoch),
                None => return Err(ClientError::NotAuthenticated),
            }
        };

        tracing::info!(token = %sanitize(&current), "Refreshing access token");
        match self.request_refresh(&current).await {
            Ok(session) => {
                let token = session.access_token.clone();
                let expires_at = session.claims.expires_at;
                if !self.install(session, Some(epoch)).await {
                    tracing::info!("Logged out while refreshing, discarding new token");
                    return Err(ClientError::NotAuthenticated);
                }
                tracing::info!(expires_at = %expires_at, "Access token refreshed");
                Ok(token)
            }
            Err(e) if self.state.read().await.epoch != epoch => {
                tracing::debug!(error = %e, "Refresh failed after logout");
                Err(ClientError::NotAuthenticated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, logging out");
                self.logout().await;
                Err(match e {
                    ClientError::RefreshFailed(_) => e,
                    other => ClientError::RefreshFailed(other.to_string()),
                })
            }
        }
    }

    async fn request_refresh(&self, current: &str) -> ClientResult<Session> {
        let response = self
            .http_client
            .post(self.url("/auth/refresh-token"))
            .bearer_auth(current)
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;

        let body: TokenResponse = read_json(response, self.timeout_ms).await?;
        let user = self
            .state
            .read()
            .await
            .current
            .as_ref()
            .and_then(|s| s.user.clone());
        Session::from_token(body.access_token, user)
    }

    /// Ask the server to send a password reset email
    pub async fn forgot_password(&self, email: &str) -> ClientResult<String> {
        validate_email(email)?;

        let response = self
            .http_client
            .post(self.url("/auth/forgot-password"))
            .query(&[("email", email.trim())])
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;

        let ack: MessageResponse = read_json(response, self.timeout_ms).await?;
        Ok(ack.message)
    }

    /// Complete a reset with the emailed token
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> ClientResult<String> {
        if reset_token.trim().is_empty() {
            return Err(ClientError::Validation("reset token is required".into()));
        }
        validate_password(new_password)?;

        let response = self
            .http_client
            .post(self.url("/auth/reset-password"))
            .query(&[("token", reset_token), ("new_password", new_password)])
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;

        let ack: MessageResponse = read_json(response, self.timeout_ms).await?;
        Ok(ack.message)
    }

    async fn current_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .current
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Make `session` the live session and persist it.
    ///
    /// With `expected_epoch` set, nothing is written if a logout happened
    /// since that epoch was read. Returns whether the session was installed.
    async fn install(&self, session: Session, expected_epoch: Option<u64>) -> bool {
        let mut state = self.state.write().await;
        if expected_epoch.is_some_and(|epoch| epoch != state.epoch) {
            return false;
        }
        if let Err(e) = self.store.save(&StoredToken::new(&session.access_token, &session.claims)) {
            // The in-memory session stays usable; only restart survival is lost
            tracing::warn!(error = %e, "Failed to persist access token");
        }
        state.current = Some(session);
        true
    }
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> Option<String> {
        self.current_token().await
    }
}

#[async_trait]
impl Authenticator for SessionManager {
    async fn refresh_token(&self, stale: &str) -> ClientResult<String> {
        let _guard = self.refresh_lock.lock().await;
        match self.current_token().await {
            Some(current) if current != stale => {
                tracing::debug!("Token already refreshed by another caller");
                Ok(current)
            }
            Some(_) => self.refresh_locked().await,
            None => Err(ClientError::NotAuthenticated),
        }
    }

    async fn logout(&self) {
        SessionManager::logout(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::test_token;
    use crate::auth::token_store::MemoryTokenStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn api_config(base_url: String) -> ApiConfig {
        ApiConfig {
            base_url,
            ws_base_url: "ws://localhost:1".into(),
            request_timeout_ms: 2_000,
        }
    }

    fn manager(base_url: String) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (SessionManager::new(&api_config(base_url), store.clone()), store)
    }

    fn future_exp(secs: i64) -> i64 {
        Utc::now().timestamp() + secs
    }

    #[tokio::test]
    async fn test_login_success_installs_session() {
        let mut server = mockito::Server::new_async().await;
        let token = test_token("42", future_exp(1800));
        let mock = server
            .mock("POST", "/api/v1/auth/login")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("username".into(), "alice@example.com".into()),
                mockito::Matcher::UrlEncoded("password".into(), "hunter22".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({"access_token": token, "token_type": "bearer"}).to_string())
            .create_async()
            .await;

        let (manager, store) = manager(server.url());
        let session = manager
            .login(&Credentials::new("alice@example.com", "hunter22"))
            .await
            .unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.user_id(), "42");
        assert!(manager.is_authenticated().await);
        assert_eq!(manager.access_token().await, Some(token.clone()));
        assert_eq!(store.load().unwrap().access_token, token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_invalid_credentials_leaves_session_unchanged() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/login")
            .with_status(401)
            .with_body(r#"{"detail":"Incorrect email or password"}"#)
            .create_async()
            .await;

        let (manager, store) = manager(server.url());
        let err = manager
            .login(&Credentials::new("alice@example.com", "wrong"))
            .await
            .unwrap_err();

        match err {
            ClientError::Authentication(msg) => assert_eq!(msg, "Incorrect email or password"),
            other => panic!("Expected Authentication, got {:?}", other),
        }
        assert!(manager.session().await.is_none());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/login")
            .with_status(429)
            .with_body(r#"{"detail":"Too many login attempts"}"#)
            .create_async()
            .await;

        let (manager, _) = manager(server.url());
        let err = manager
            .login(&Credentials::new("alice", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_login_with_malformed_token_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/login")
            .with_status(200)
            .with_body(r#"{"access_token":"not-a-jwt","token_type":"bearer"}"#)
            .create_async()
            .await;

        let (manager, store) = manager(server.url());
        let err = manager.login(&Credentials::new("alice", "pw")).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidToken(_)));
        assert!(manager.session().await.is_none());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_session() {
        let (manager, store) = manager("http://127.0.0.1:9".into());
        let token = test_token("42", future_exp(600));
        store.save(&StoredToken::new(&token, &Claims::decode(&token).unwrap())).unwrap();
        assert!(manager.restore().await);

        manager.logout().await;
        assert!(manager.session().await.is_none());
        assert!(store.load().is_none());
        assert_eq!(manager.access_token().await, None);

        // Logging out twice is harmless
        manager.logout().await;
    }

    #[tokio::test]
    async fn test_restore_clears_expired_token() {
        let (manager, store) = manager("http://127.0.0.1:9".into());
        let token = test_token("42", future_exp(-60));
        store.save(&StoredToken::new(&token, &Claims::decode(&token).unwrap())).unwrap();

        assert!(!manager.restore().await);
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_restore_clears_malformed_token() {
        let (manager, store) = manager("http://127.0.0.1:9".into());
        store
            .save(&StoredToken {
                access_token: "garbage".into(),
                token_expiry: future_exp(600),
                user_id: "42".into(),
            })
            .unwrap();

        assert!(!manager.restore().await);
        assert!(store.load().is_none());
        assert!(manager.session().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh-token")
            .with_status(401)
            .with_body(r#"{"detail":"Token has expired"}"#)
            .create_async()
            .await;

        let (manager, store) = manager(server.url());
        let token = test_token("42", future_exp(60));
        store.save(&StoredToken::new(&token, &Claims::decode(&token).unwrap())).unwrap();
        assert!(manager.restore().await);

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert!(manager.session().await.is_none());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let (manager, _) = manager("http://127.0.0.1:9".into());
        assert!(matches!(manager.refresh().await, Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_token_skips_when_already_replaced() {
        let mut server = mockito::Server::new_async().await;
        let fresh = test_token("42", future_exp(1800));
        let mock = server
            .mock("POST", "/api/v1/auth/refresh-token")
            .with_status(200)
            .with_body(serde_json::json!({"access_token": fresh}).to_string())
            .expect(1)
            .create_async()
            .await;

        let (manager, store) = manager(server.url());
        let stale = test_token("42", future_exp(60));
        store.save(&StoredToken::new(&stale, &Claims::decode(&stale).unwrap())).unwrap();
        manager.restore().await;

        // Two callers saw the same stale token; only one refresh reaches the server
        let first = manager.refresh_token(&stale).await.unwrap();
        let second = manager.refresh_token(&stale).await.unwrap();
        assert_eq!(first, fresh);
        assert_eq!(second, fresh);
        mock.assert_async().await;
    }

    /// Answers a single request with `body`, holding the response until
    /// `release` fires. `arrived` fires once the request head is read.
    async fn held_server(body: String) -> (String, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let _ = arrived_tx.send(());
            let _ = release_rx.await;

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });

        (url, arrived_rx, release_tx)
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_undone() {
        let fresh = test_token("42", future_exp(1800));
        let (url, arrived, release) =
            held_server(serde_json::json!({"access_token": fresh}).to_string()).await;

        let (manager, store) = manager(url);
        let manager = Arc::new(manager);
        let stale = test_token("42", future_exp(60));
        store.save(&StoredToken::new(&stale, &Claims::decode(&stale).unwrap())).unwrap();
        assert!(manager.restore().await);

        let refreshing = tokio::spawn({
            let manager = manager.clone();
            async move { manager.refresh().await }
        });

        // Log out while the server still holds the refresh response
        arrived.await.unwrap();
        manager.logout().await;
        release.send(()).unwrap();

        let result = refreshing.await.unwrap();
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
        assert!(manager.session().await.is_none());
        assert_eq!(manager.access_token().await, None);
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_register_validates_before_sending() {
        let (manager, _) = manager("http://127.0.0.1:9".into());
        let err = manager
            .register(&RegisterRequest {
                email: "not-an-email".into(),
                username: "alice".into(),
                password: "long-enough".into(),
                full_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_surfaces_duplicate_email() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/register")
            .with_status(400)
            .with_body(r#"{"detail":"The user with this email already exists in the system."}"#)
            .create_async()
            .await;

        let (manager, _) = manager(server.url());
        let err = manager
            .register(&RegisterRequest {
                email: "alice@example.com".into(),
                username: "alice".into(),
                password: "long-enough".into(),
                full_name: Some("Alice".into()),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password() {
        let mut server = mockito::Server::new_async().await;
        let forgot = server
            .mock("POST", "/api/v1/auth/forgot-password")
            .match_query(mockito::Matcher::UrlEncoded("email".into(), "alice@example.com".into()))
            .with_status(200)
            .with_body(r#"{"message":"Password recovery email sent"}"#)
            .create_async()
            .await;
        let reset = server
            .mock("POST", "/api/v1/auth/reset-password")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("token".into(), "reset-123".into()),
                mockito::Matcher::UrlEncoded("new_password".into(), "brand-new-pw".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"message":"Password reset successful"}"#)
            .create_async()
            .await;

        let (manager, _) = manager(server.url());
        assert_eq!(
            manager.forgot_password("alice@example.com").await.unwrap(),
            "Password recovery email sent"
        );
        assert_eq!(
            manager.reset_password("reset-123", "brand-new-pw").await.unwrap(),
            "Password reset successful"
        );
        forgot.assert_async().await;
        reset.assert_async().await;
    }

    #[tokio::test]
    async fn test_reset_password_rejects_short_password() {
        let (manager, _) = manager("http://127.0.0.1:9".into());
        let err = manager.reset_password("reset-123", "short").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let token = test_token("42", future_exp(600));
        let session = Session::from_token(token.clone(), None).unwrap();
        let debug = format!("{:?}", session);
        assert!(!debug.contains(&token));
        assert!(debug.contains("SanitizedValue(***)"));
    }
}
