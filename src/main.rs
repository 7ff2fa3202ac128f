//! Market Pulse - demo entry point
//!
//! 1. Loads configuration (`config.yaml`, or defaults)
//! 2. Restores the persisted session, or logs in from the environment
//! 3. Keeps the token fresh with the expiry watcher
//! 4. Streams the configured topic and logs every pushed event

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use market_pulse::auth::{
    expiry_watcher_task, Credentials, FileTokenStore, MemoryTokenStore, SessionManager,
    TokenStore, WatcherConfig,
};
use market_pulse::config::{self, constants, AppConfig};
use market_pulse::core::logging::init_logging;
use market_pulse::gateway::ApiGateway;
use market_pulse::realtime::{RealtimeChannel, Topic};

const CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();

    init_logging();
    info!("Market Pulse client starting...");
    constants::log_configuration();

    let config = if Path::new(CONFIG_PATH).exists() {
        match config::load_config(Path::new(CONFIG_PATH)) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("[CONFIG] Configuration failed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("[CONFIG] {} not found, using defaults", CONFIG_PATH);
        AppConfig::default()
    };

    let store: Arc<dyn TokenStore> = match &config.session.token_file {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => Arc::new(MemoryTokenStore::new()),
    };
    let session = Arc::new(SessionManager::new(&config.api, store));

    if !session.restore().await {
        match credentials_from_env() {
            Some(credentials) => {
                if let Err(e) = session.login(&credentials).await {
                    warn!("[AUTH] Login failed: {}", e);
                }
            }
            None => info!("[AUTH] No stored session and no credentials, continuing anonymously"),
        }
    }

    let gateway = ApiGateway::new(&config.api, config.retry.clone(), session.clone());
    if session.is_authenticated().await {
        match gateway.me().await {
            Ok(user) => info!(username = %user.username, "[AUTH] Signed in"),
            Err(e) if e.is_auth_failure() => warn!("[AUTH] Session rejected, continuing anonymously: {}", e),
            Err(e) => warn!("[AUTH] Could not load profile: {}", e),
        }
    }

    // Create shutdown broadcast channel
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let watcher = tokio::spawn(expiry_watcher_task(
        session.clone(),
        WatcherConfig::from(&config.session),
        shutdown_tx.subscribe(),
    ));

    let mut channel = RealtimeChannel::new(&config.api, &config.realtime, session.clone());
    channel.on_any(|event| {
        info!(
            kind = %event.kind,
            symbol = ?event.symbol,
            data = %event.data,
            "[EVENT] Realtime update"
        );
    });

    match config.realtime.topic.as_deref().map(str::parse::<Topic>) {
        Some(Ok(topic)) => {
            if let Err(e) = channel.connect(topic, config.realtime.symbol.as_deref()).await {
                error!("[REALTIME] Cannot bind channel: {}", e);
            }
        }
        Some(Err(e)) => error!("[REALTIME] {}", e),
        None => info!("[REALTIME] No realtime.topic configured, not streaming"),
    }

    // Spawn SIGINT handler task
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                let _ = shutdown_signal.send(());
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C signal: {}", err);
            }
        }
    });

    let _ = shutdown_rx.recv().await;

    channel.close().await;
    if let Err(e) = watcher.await {
        warn!("[SHUTDOWN] Expiry watcher ended abnormally: {}", e);
    }

    info!("[SHUTDOWN] Clean exit");
    Ok(())
}

fn credentials_from_env() -> Option<Credentials> {
    let username = std::env::var("MARKET_PULSE_USERNAME").ok()?;
    let password = std::env::var("MARKET_PULSE_PASSWORD").ok()?;
    Some(Credentials::new(username, password))
}
