//! Push message envelope and handler dispatch
//!
//! Dispatch looks only at the `type` field; `data` is handed to handlers
//! untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Value of the envelope's `type` field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    PriceUpdate,
    TradingSignal,
    PortfolioUpdate,
    Sentiment,
    /// Anything else the server sends
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::PriceUpdate => "price_update",
            MessageKind::TradingSignal => "trading_signal",
            MessageKind::PortfolioUpdate => "portfolio_update",
            MessageKind::Sentiment => "sentiment",
            MessageKind::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "price_update" => MessageKind::PriceUpdate,
            "trading_signal" => MessageKind::TradingSignal,
            "portfolio_update" => MessageKind::PortfolioUpdate,
            "sentiment" => MessageKind::Sentiment,
            _ => MessageKind::Other(kind),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(kind: &str) -> Self {
        MessageKind::from(kind.to_string())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "type": ..., "symbol": ..., "data": ..., "timestamp": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Callback invoked for each dispatched envelope
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Routes envelopes to handlers registered per kind
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Vec<Handler>>,
    fallback: Vec<Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for one message kind
    pub fn on<F>(&mut self, kind: impl Into<MessageKind>, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register `handler` for every message kind
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.fallback.push(Arc::new(handler));
    }

    /// Handlers that should see a message of `kind`, specific ones first
    pub fn handlers_for(&self, kind: &MessageKind) -> Vec<Handler> {
        self.handlers
            .get(kind)
            .into_iter()
            .flatten()
            .chain(self.fallback.iter())
            .cloned()
            .collect()
    }

    /// Deliver `envelope`; returns how many handlers saw it
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let handlers = self.handlers_for(&envelope.kind);
        for handler in &handlers {
            handler(envelope);
        }
        handlers.len()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.handlers.keys().map(MessageKind::as_str).collect();
        f.debug_struct("Dispatcher")
            .field("kinds", &kinds)
            .field("fallback", &self.fallback.len())
            .finish()
    }
}
