//! End-to-end session and gateway tests against a mocked backend
//!
//! Covers the full token lifecycle:
//! 1. Login, authenticated calls, logout
//! 2. Proactive refresh by the expiry watcher
//! 3. 401-triggered refresh-and-retry through the gateway
//! 4. Forced logout when the refreshed token is rejected too
//!
//! # Running the tests
//! ```bash
//! cargo test --test full_cycle
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use tokio::sync::broadcast;

use market_pulse::auth::{
    expiry_watcher_task, Credentials, FileTokenStore, MemoryTokenStore, SessionManager,
    TokenSource, TokenStore, WatcherConfig,
};
use market_pulse::core::retry::RetryConfig;
use market_pulse::gateway::ApiGateway;
use market_pulse::ClientError;

use common::{api_config, login_body, token_expiring_in};

fn no_retry() -> RetryConfig {
    RetryConfig {
        jitter_ms: 0,
        ..RetryConfig::no_retry()
    }
}

struct Harness {
    session: Arc<SessionManager>,
    store: Arc<MemoryTokenStore>,
    gateway: ApiGateway,
}

fn harness(server_url: &str) -> Harness {
    let api = api_config(server_url, "ws://127.0.0.1:9");
    let store = Arc::new(MemoryTokenStore::new());
    let session = Arc::new(SessionManager::new(&api, store.clone()));
    let gateway = ApiGateway::new(&api, no_retry(), session.clone());
    Harness {
        session,
        store,
        gateway,
    }
}

async fn mock_login(server: &mut mockito::ServerGuard, token: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/v1/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(login_body(token))
        .create_async()
        .await
}

// =============================================================================
// Login / logout
// =============================================================================

#[tokio::test]
async fn test_login_then_logout_drops_bearer() {
    let mut server = mockito::Server::new_async().await;
    let token = token_expiring_in("1", 1800);
    let _login = mock_login(&mut server, &token).await;

    let with_bearer = server
        .mock("GET", "/api/v1/users/me")
        .match_header("authorization", format!("Bearer {}", token).as_str())
        .with_status(200)
        .with_body(r#"{"username":"alice","email":"alice@example.com"}"#)
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    let session = h
        .session
        .login(&Credentials::new("alice@example.com", "correct-horse"))
        .await
        .unwrap();
    assert_eq!(session.user.as_ref().map(|u| u.username.as_str()), Some("alice"));

    let me = h.gateway.me().await.unwrap();
    assert_eq!(me.username, "alice");
    with_bearer.assert_async().await;

    h.session.logout().await;
    assert!(h.store.load().is_none());
    assert_eq!(h.session.access_token().await, None);

    let anonymous = server
        .mock("GET", "/api/v1/market/quote/AAPL")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"symbol":"AAPL","price":189.5}"#)
        .expect(1)
        .create_async()
        .await;

    let quote = h.gateway.quote("AAPL").await.unwrap();
    assert_eq!(quote.price, 189.5);
    anonymous.assert_async().await;
}

#[tokio::test]
async fn test_invalid_login_keeps_previous_session() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(&server.url());

    let good = token_expiring_in("1", 1800);
    let first = mock_login(&mut server, &good).await;
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();
    first.remove_async().await;

    let _rejected = server
        .mock("POST", "/api/v1/auth/login")
        .with_status(401)
        .with_body(r#"{"detail":"Incorrect email or password"}"#)
        .create_async()
        .await;

    let err = h
        .session
        .login(&Credentials::new("mallory", "wrong"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Incorrect email or password"));
    assert_eq!(h.session.access_token().await, Some(good.clone()));
    assert_eq!(h.store.load().unwrap().access_token, good);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let mut server = mockito::Server::new_async().await;
    let token = token_expiring_in("1", 1800);
    let _login = mock_login(&mut server, &token).await;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let api = api_config(&server.url(), "ws://127.0.0.1:9");

    let first = SessionManager::new(&api, Arc::new(FileTokenStore::new(&path)));
    first
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();
    drop(first);

    let second = SessionManager::new(&api, Arc::new(FileTokenStore::new(&path)));
    assert!(second.restore().await);
    assert_eq!(second.access_token().await, Some(token));

    second.logout().await;
    assert!(!path.exists());
}

// =============================================================================
// Expiry watcher
// =============================================================================

#[tokio::test]
async fn test_watcher_refreshes_once_before_expiry() {
    let mut server = mockito::Server::new_async().await;
    let short = token_expiring_in("1", 60);
    let fresh = token_expiring_in("1", 1800);
    let _login = mock_login(&mut server, &short).await;
    let refresh = server
        .mock("POST", "/api/v1/auth/refresh-token")
        .match_header("authorization", format!("Bearer {}", short).as_str())
        .with_status(200)
        .with_body(serde_json::json!({"access_token": fresh, "token_type": "bearer"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let watcher = tokio::spawn(expiry_watcher_task(
        h.session.clone(),
        WatcherConfig {
            check_interval: Duration::from_millis(50),
            refresh_threshold: Duration::from_secs(300),
        },
        shutdown_rx,
    ));

    // Several check cycles; only the first one is below threshold
    tokio::time::sleep(Duration::from_millis(400)).await;
    let _ = shutdown_tx.send(());
    watcher.await.unwrap().unwrap();

    refresh.assert_async().await;
    assert_eq!(h.session.access_token().await, Some(fresh.clone()));
    assert_eq!(h.store.load().unwrap().access_token, fresh);
}

#[tokio::test]
async fn test_watcher_failed_refresh_logs_out() {
    let mut server = mockito::Server::new_async().await;
    let short = token_expiring_in("1", 30);
    let _login = mock_login(&mut server, &short).await;
    let _refresh = server
        .mock("POST", "/api/v1/auth/refresh-token")
        .with_status(401)
        .with_body(r#"{"detail":"Could not validate credentials"}"#)
        .create_async()
        .await;

    let h = harness(&server.url());
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let watcher = tokio::spawn(expiry_watcher_task(
        h.session.clone(),
        WatcherConfig {
            check_interval: Duration::from_millis(50),
            refresh_threshold: Duration::from_secs(300),
        },
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = shutdown_tx.send(());
    watcher.await.unwrap().unwrap();

    assert!(!h.session.is_authenticated().await);
    assert!(h.store.load().is_none());
}

// =============================================================================
// Gateway refresh-and-retry
// =============================================================================

#[tokio::test]
async fn test_gateway_401_refreshes_once_and_retries_once() {
    let mut server = mockito::Server::new_async().await;
    let old = token_expiring_in("1", 1800);
    let new = token_expiring_in("1", 3600);
    let _login = mock_login(&mut server, &old).await;

    let rejected = server
        .mock("GET", "/api/v1/trading/portfolios/4")
        .match_header("authorization", format!("Bearer {}", old).as_str())
        .with_status(401)
        .with_body(r#"{"detail":"Could not validate credentials"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/v1/auth/refresh-token")
        .with_status(200)
        .with_body(serde_json::json!({"access_token": new}).to_string())
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/api/v1/trading/portfolios/4")
        .match_header("authorization", format!("Bearer {}", new).as_str())
        .with_status(200)
        .with_body(r#"{"data":{"id":4,"name":"Swing"},"meta":{"request_id":"x"}}"#)
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();

    let portfolio = h.gateway.portfolio(4).await.unwrap();
    assert_eq!(portfolio.name, "Swing");

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(h.session.access_token().await, Some(new));
}

#[tokio::test]
async fn test_gateway_second_401_logs_out() {
    let mut server = mockito::Server::new_async().await;
    let old = token_expiring_in("1", 1800);
    let new = token_expiring_in("1", 3600);
    let _login = mock_login(&mut server, &old).await;

    let always_401 = server
        .mock("GET", "/api/v1/users/me")
        .with_status(401)
        .with_body(r#"{"detail":"Could not validate credentials"}"#)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/v1/auth/refresh-token")
        .with_status(200)
        .with_body(serde_json::json!({"access_token": new}).to_string())
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();

    let err = h.gateway.me().await.unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)));

    always_401.assert_async().await;
    refresh.assert_async().await;
    assert!(h.session.session().await.is_none());
    assert!(h.store.load().is_none());
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    let old = token_expiring_in("1", 1800);
    let new = token_expiring_in("1", 3600);
    let _login = mock_login(&mut server, &old).await;

    let _rejected = server
        .mock("GET", "/api/v1/watchlist")
        .match_header("authorization", format!("Bearer {}", old).as_str())
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/v1/auth/refresh-token")
        .with_status(200)
        .with_body(serde_json::json!({"access_token": new}).to_string())
        .expect(1)
        .create_async()
        .await;
    let _accepted = server
        .mock("GET", "/api/v1/watchlist")
        .match_header("authorization", format!("Bearer {}", new).as_str())
        .with_status(200)
        .with_body(r#"[{"id":1,"name":"Tech","symbols":["AAPL","MSFT"]}]"#)
        .expect(2)
        .create_async()
        .await;

    let h = harness(&server.url());
    h.session
        .login(&Credentials::new("alice", "correct-horse"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(h.gateway.watchlists(), h.gateway.watchlists());
    assert_eq!(a.unwrap()[0].symbols.len(), 2);
    assert_eq!(b.unwrap()[0].name, "Tech");
    refresh.assert_async().await;
}
