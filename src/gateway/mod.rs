//! Authenticated REST access to the backend

pub mod client;
mod endpoints;
pub mod models;

pub use client::{ApiGateway, ApiRequest};
pub use models::{
    Envelope, OrderReceipt, OrderRequest, OrderSide, OrderStatus, OrderType, Portfolio,
    PortfolioCreate, Position, Quote, ResponseMeta, RiskLimits, SentimentSnapshot, Watchlist,
};
