//! Topics and channel bindings
//!
//! A `Subscription` is what the caller asks for (topic plus optional
//! symbol). A `ChannelBinding` is one connection attempt's view of it: the
//! subscription plus whatever access token the session held at that moment.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, ClientResult};

/// Push topics served under `/ws`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Trading signals for one symbol
    Trading,
    /// The authenticated user's portfolio
    Portfolio,
    /// Sentiment for one symbol, or the authenticated feed without one
    Sentiment,
    /// Sentiment and trading signals for one symbol
    Combined,
}

impl Topic {
    /// Topics that present the access token when connecting
    pub fn is_privileged(self) -> bool {
        matches!(self, Topic::Portfolio | Topic::Combined)
    }

    fn needs_symbol(self) -> bool {
        matches!(self, Topic::Trading | Topic::Combined)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Trading => "trading",
            Topic::Portfolio => "portfolio",
            Topic::Sentiment => "sentiment",
            Topic::Combined => "combined",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ClientError;

    fn from_str(s: &str) -> ClientResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trading" => Ok(Topic::Trading),
            "portfolio" => Ok(Topic::Portfolio),
            "sentiment" => Ok(Topic::Sentiment),
            "combined" => Ok(Topic::Combined),
            other => Err(ClientError::Validation(format!("unknown topic '{}'", other))),
        }
    }
}

/// Topic and symbol a channel is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Topic,
    pub key: Option<String>,
}

impl Subscription {
    /// Validate and normalise a topic/symbol pair.
    ///
    /// The portfolio stream is per-user, so any key is dropped.
    pub fn new(topic: Topic, key: Option<&str>) -> ClientResult<Self> {
        let key = match (topic, key.map(str::trim).filter(|k| !k.is_empty())) {
            (Topic::Portfolio, _) => None,
            (_, Some(symbol)) => Some(validate_symbol(symbol)?),
            (topic, None) if topic.needs_symbol() => {
                return Err(ClientError::Validation(format!(
                    "topic '{}' needs a symbol",
                    topic
                )))
            }
            (_, None) => None,
        };
        Ok(Self { topic, key })
    }

    /// Whether the server will refuse this subscription without a token
    pub fn requires_token(&self) -> bool {
        self.topic.is_privileged() || (self.topic == Topic::Sentiment && self.key.is_none())
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}/{}", self.topic, key),
            None => write!(f, "{}", self.topic),
        }
    }
}

/// Ticker symbols are also used as URL path segments, so anything that
/// could change the path (`/`, `?`, a bare `..`) is rejected
pub(crate) fn validate_symbol(symbol: &str) -> ClientResult<String> {
    let ok = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !ok || symbol.chars().all(|c| c == '.') {
        return Err(ClientError::Validation(format!("invalid symbol '{}'", symbol)));
    }
    Ok(symbol.to_ascii_uppercase())
}

/// One connection attempt's binding. Never mutated; a new attempt builds
/// a new binding with the token current at that time.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub subscription: Subscription,
    pub auth_token: Option<String>,
}

impl ChannelBinding {
    pub fn new(subscription: Subscription, auth_token: Option<String>) -> Self {
        Self {
            subscription,
            auth_token,
        }
    }

    /// WebSocket URL under `ws_base_url`
    pub fn url(&self, ws_base_url: &str) -> ClientResult<String> {
        let base = ws_base_url.trim_end_matches('/');
        let sub = &self.subscription;

        let path = match (sub.topic, &sub.key) {
            (Topic::Portfolio, _) => "/ws/portfolio".to_string(),
            (topic, Some(key)) => format!("/ws/{}/{}", topic, key),
            (topic, None) => format!("/ws/{}", topic),
        };

        if !sub.requires_token() {
            return Ok(format!("{}{}", base, path));
        }

        match &self.auth_token {
            Some(token) => Ok(format!("{}{}?token={}", base, path, token)),
            None => Err(ClientError::NotAuthenticated),
        }
    }
}

impl fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("subscription", &self.subscription)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .finish()
    }
}
