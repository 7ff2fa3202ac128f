//! Typed helpers over `ApiGateway::send`

use crate::auth::UserProfile;
use crate::error::ClientResult;
use crate::gateway::client::{ApiGateway, ApiRequest};
use crate::gateway::models::{
    Envelope, OrderReceipt, OrderRequest, Portfolio, PortfolioCreate, Quote, RiskLimits,
    SentimentSnapshot, Watchlist,
};
use crate::realtime::binding::validate_symbol;

impl ApiGateway {
    /// `GET /users/me`
    pub async fn me(&self) -> ClientResult<UserProfile> {
        self.send_json(&ApiRequest::get("/users/me")).await
    }

    /// `PUT /users/me` (email and strategy config are what the server applies)
    pub async fn update_me(&self, profile: &UserProfile) -> ClientResult<UserProfile> {
        self.send_json(&ApiRequest::put("/users/me").json(profile)?).await
    }

    pub async fn create_portfolio(&self, portfolio: &PortfolioCreate) -> ClientResult<Portfolio> {
        portfolio.validate()?;
        let request = ApiRequest::post("/trading/portfolios").json(portfolio)?;
        let envelope: Envelope<Portfolio> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn portfolio(&self, portfolio_id: i64) -> ClientResult<Portfolio> {
        let request = ApiRequest::get(format!("/trading/portfolios/{}", portfolio_id));
        let envelope: Envelope<Portfolio> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    /// Place an order. Validated locally, sent once, never replayed.
    pub async fn place_order(&self, portfolio_id: i64, order: &OrderRequest) -> ClientResult<OrderReceipt> {
        order.validate()?;
        tracing::info!(
            portfolio_id,
            symbol = %order.symbol,
            side = ?order.side,
            order_type = ?order.order_type,
            quantity = order.quantity,
            "Placing order"
        );
        let request =
            ApiRequest::post(format!("/trading/portfolios/{}/orders", portfolio_id)).json(order)?;
        let envelope: Envelope<OrderReceipt> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn set_risk_limits(&self, portfolio_id: i64, limits: &RiskLimits) -> ClientResult<RiskLimits> {
        limits.validate()?;
        let request =
            ApiRequest::post(format!("/trading/portfolios/{}/risk-limits", portfolio_id)).json(limits)?;
        let envelope: Envelope<RiskLimits> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn watchlists(&self) -> ClientResult<Vec<Watchlist>> {
        self.send_json(&ApiRequest::get("/watchlist")).await
    }

    pub async fn quote(&self, symbol: &str) -> ClientResult<Quote> {
        let symbol = validate_symbol(symbol.trim())?;
        self.send_json(&ApiRequest::get(format!("/market/quote/{}", symbol))).await
    }

    /// Aggregate sentiment for `symbol` over the last `days` days
    pub async fn sentiment(&self, symbol: &str, days: u32) -> ClientResult<SentimentSnapshot> {
        let symbol = validate_symbol(symbol.trim())?;
        let request =
            ApiRequest::get(format!("/sentiment/aggregate/{}", symbol)).query("days", days);
        self.send_json(&request).await
    }
}
