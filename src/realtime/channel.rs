//! Reconnecting realtime channel
//!
//! One `RealtimeChannel` owns at most one supervisor task. The supervisor
//! runs the `Connecting -> Open -> Closed -> Connecting` loop for a single
//! binding version until it is cancelled. Rebinding bumps the version,
//! cancels the supervisor and waits for it to close its socket before the
//! next one is spawned, so two sockets are never open for one channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::TokenSource;
use crate::config::{ApiConfig, RealtimeConfig};
use crate::core::logging::redact_url;
use crate::error::ClientResult;
use crate::realtime::binding::{ChannelBinding, Subscription, Topic};
use crate::realtime::message::{Dispatcher, Envelope, MessageKind};
use crate::realtime::reconnect::ReconnectStrategy;
use crate::realtime::websocket::{connect, WsStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
}

/// Observable state of the current binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Reconnects since the last successful open
    pub retry_count: u32,
    /// Set while waiting to reconnect
    pub next_retry_delay: Option<Duration>,
    /// Binding version this state belongs to
    pub version: u64,
}

impl ConnectionState {
    fn closed(version: u64) -> Self {
        Self {
            status: ConnectionStatus::Closed,
            retry_count: 0,
            next_retry_delay: None,
            version,
        }
    }
}

struct ActiveBinding {
    subscription: Subscription,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Push-data client bound to one topic at a time
pub struct RealtimeChannel {
    ws_base_url: String,
    connect_timeout: Duration,
    strategy: ReconnectStrategy,
    tokens: Arc<dyn TokenSource>,
    dispatcher: Arc<RwLock<Dispatcher>>,
    version: Arc<AtomicU64>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    active: Option<ActiveBinding>,
}

impl RealtimeChannel {
    pub fn new(api: &ApiConfig, config: &RealtimeConfig, tokens: Arc<dyn TokenSource>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::closed(0));
        Self {
            ws_base_url: api.ws_base_url.clone(),
            connect_timeout: api.request_timeout(),
            strategy: config.reconnect.clone(),
            tokens,
            dispatcher: Arc::new(RwLock::new(Dispatcher::new())),
            version: Arc::new(AtomicU64::new(0)),
            state_tx: Arc::new(state_tx),
            active: None,
        }
    }

    /// Register a handler for one message kind. Handlers run on the
    /// supervisor task and must not block.
    pub fn on<F>(&self, kind: impl Into<MessageKind>, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        match self.dispatcher.write() {
            Ok(mut d) => d.on(kind, handler),
            Err(poisoned) => poisoned.into_inner().on(kind, handler),
        }
    }

    /// Register a handler for every message kind
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        match self.dispatcher.write() {
            Ok(mut d) => d.on_any(handler),
            Err(poisoned) => poisoned.into_inner().on_any(handler),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscription of the live binding, if any
    pub fn subscription(&self) -> Option<&Subscription> {
        self.active.as_ref().map(|a| &a.subscription)
    }

    /// Current binding version; bumps on every rebind and on close
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Bind to `topic`/`key` and start connecting
    pub async fn connect(&mut self, topic: Topic, key: Option<&str>) -> ClientResult<()> {
        self.rebind(topic, key).await
    }

    /// Replace the current binding.
    ///
    /// The old socket is closed before the new one is opened. Invalid
    /// topic/key pairs are rejected before anything is torn down.
    pub async fn rebind(&mut self, topic: Topic, key: Option<&str>) -> ClientResult<()> {
        let subscription = Subscription::new(topic, key)?;

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.teardown().await;

        info!(subscription = %subscription, version, "Binding realtime channel");
        let cancel = CancellationToken::new();
        let supervisor = Supervisor {
            ws_base_url: self.ws_base_url.clone(),
            connect_timeout: self.connect_timeout,
            subscription: subscription.clone(),
            strategy: self.strategy.clone(),
            tokens: self.tokens.clone(),
            dispatcher: self.dispatcher.clone(),
            version,
            current_version: self.version.clone(),
            state_tx: self.state_tx.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(supervisor.run());

        self.active = Some(ActiveBinding {
            subscription,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Close the socket and stop reconnecting
    pub async fn close(&mut self) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.teardown().await;
        self.state_tx.send_replace(ConnectionState::closed(version));
    }

    async fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.handle.await {
            warn!(subscription = %active.subscription, error = %e, "Realtime supervisor ended abnormally");
        }
        debug!(subscription = %active.subscription, "Realtime binding torn down");
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

/// Why a connected session ended
enum SessionEnd {
    Cancelled,
    Dropped(String),
}

/// Connect/read/reconnect loop for one binding version
struct Supervisor {
    ws_base_url: String,
    connect_timeout: Duration,
    subscription: Subscription,
    strategy: ReconnectStrategy,
    tokens: Arc<dyn TokenSource>,
    dispatcher: Arc<RwLock<Dispatcher>>,
    version: u64,
    current_version: Arc<AtomicU64>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl Supervisor {
    fn is_current(&self) -> bool {
        self.current_version.load(Ordering::SeqCst) == self.version
    }

    fn publish(&self, status: ConnectionStatus, retry_count: u32, next_retry_delay: Option<Duration>) {
        if !self.is_current() {
            return;
        }
        self.state_tx.send_replace(ConnectionState {
            status,
            retry_count,
            next_retry_delay,
            version: self.version,
        });
    }

    async fn run(self) {
        let mut retry: u32 = 0;

        loop {
            self.publish(ConnectionStatus::Connecting, retry, None);

            // The token is re-read for every attempt so a refresh is picked up
            let binding = ChannelBinding::new(self.subscription.clone(), self.tokens.access_token().await);

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.open(&binding) => result,
            };

            match attempt {
                Ok(stream) => {
                    retry = 0;
                    self.publish(ConnectionStatus::Open, 0, None);
                    info!(subscription = %self.subscription, version = self.version, "Realtime channel open");

                    match self.read_loop(stream).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Dropped(reason) => {
                            warn!(subscription = %self.subscription, reason = %reason, "Realtime channel dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        subscription = %self.subscription,
                        attempt = retry + 1,
                        error = %e,
                        "Realtime connect failed"
                    );
                }
            }

            let delay = self.strategy.delay_for(retry);
            retry = retry.saturating_add(1);
            self.publish(ConnectionStatus::Closed, retry, Some(delay));
            info!(
                subscription = %self.subscription,
                delay_ms = delay.as_millis() as u64,
                retry,
                "[RECONNECT] Scheduling realtime reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(ConnectionStatus::Closed, 0, None);
        debug!(subscription = %self.subscription, version = self.version, "Realtime supervisor stopped");
    }

    async fn open(&self, binding: &ChannelBinding) -> ClientResult<WsStream> {
        let url = binding.url(&self.ws_base_url)?;
        debug!(url = %redact_url(&url), "Connecting realtime channel");
        connect(&url, self.connect_timeout).await
    }

    async fn read_loop(&self, stream: WsStream) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return SessionEnd::Cancelled;
                }
                next = read.next() => match next {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("server closed ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "server closed".to_string());
                        return SessionEnd::Dropped(reason);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // Answered by tungstenite on the next flush
                        trace!("Ping received: {:?}", data);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        if !self.is_current() {
            trace!(version = self.version, "Discarding message from stale binding");
            return;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                let preview: String = text.chars().take(200).collect();
                warn!(error = %e, preview = %preview, "Dropping unparseable realtime message");
                return;
            }
        };

        trace!(kind = %envelope.kind, symbol = ?envelope.symbol, "Dispatching realtime message");
        // Handlers run without the lock held so they may register more handlers
        let handlers = match self.dispatcher.read() {
            Ok(d) => d.handlers_for(&envelope.kind),
            Err(poisoned) => poisoned.into_inner().handlers_for(&envelope.kind),
        };
        if handlers.is_empty() {
            trace!(kind = %envelope.kind, "No handler registered");
        }
        for handler in &handlers {
            handler(&envelope);
        }
    }
}
