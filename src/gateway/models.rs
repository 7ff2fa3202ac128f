//! REST payloads for the trading, watchlist, market and sentiment endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

// ============================================================================
// Envelope
// ============================================================================

/// Metadata attached to wrapped responses
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_items: Option<u64>,
}

/// `{ "data": ..., "meta": ... }` success wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub meta: ResponseMeta,
}

// ============================================================================
// Trading
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    fn needs_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    fn needs_stop_price(self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

/// Body of `POST /trading/portfolios/{id}/orders`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            stop_price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(ClientError::Validation("order symbol is required".into()));
        }
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(ClientError::Validation(format!(
                "order quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.order_type.needs_price() && !is_positive(self.price) {
            return Err(ClientError::Validation(format!(
                "{:?} orders need a positive price",
                self.order_type
            )));
        }
        if self.order_type.needs_stop_price() && !is_positive(self.stop_price) {
            return Err(ClientError::Validation(format!(
                "{:?} orders need a positive stop price",
                self.order_type
            )));
        }
        Ok(())
    }
}

fn is_positive(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite() && v > 0.0)
}

/// Order as acknowledged by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderReceipt {
    #[serde(default)]
    pub id: Option<i64>,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default = "default_order_status")]
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_order_status() -> OrderStatus {
    OrderStatus::Pending
}

/// Body of `POST /trading/portfolios`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioCreate {
    pub name: String,
    pub initial_balance: f64,
}

impl PortfolioCreate {
    pub fn validate(&self) -> ClientResult<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Validation("portfolio name is required".into()));
        }
        if !(self.initial_balance.is_finite() && self.initial_balance >= 0.0) {
            return Err(ClientError::Validation(format!(
                "initial balance cannot be negative, got {}",
                self.initial_balance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub id: Option<i64>,
    pub symbol: String,
    pub quantity: f64,
    #[serde(default)]
    pub average_entry_price: f64,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub cash_balance: f64,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body and response of `POST /trading/portfolios/{id}/risk-limits`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: f64,
    pub max_drawdown: f64,
    pub max_leverage: f64,
    pub stop_loss_percentage: f64,
    pub take_profit_percentage: f64,
}

impl RiskLimits {
    pub fn validate(&self) -> ClientResult<()> {
        let fields = [
            ("max_position_size", self.max_position_size),
            ("max_drawdown", self.max_drawdown),
            ("max_leverage", self.max_leverage),
            ("stop_loss_percentage", self.stop_loss_percentage),
            ("take_profit_percentage", self.take_profit_percentage),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ClientError::Validation(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Market data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Watchlist {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Aggregate sentiment over a window of days
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentimentSnapshot {
    #[serde(default)]
    pub compound_score: f64,
    #[serde(default)]
    pub positive_score: f64,
    #[serde(default)]
    pub neutral_score: f64,
    #[serde(default)]
    pub negative_score: f64,
    #[serde(default)]
    pub sample_size: u64,
}
