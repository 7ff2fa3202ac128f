//! Reconnecting push channel for market, sentiment and portfolio updates

pub mod binding;
pub mod channel;
pub mod message;
pub mod reconnect;
pub mod websocket;

pub use binding::{ChannelBinding, Subscription, Topic};
pub use channel::{ConnectionState, ConnectionStatus, RealtimeChannel};
pub use message::{Dispatcher, Envelope, Handler, MessageKind};
pub use reconnect::ReconnectStrategy;
