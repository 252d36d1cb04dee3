//! Live last-price lookup used when no order book is cached for a symbol

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{PumpGateError, Result};

/// Binance REST endpoint
pub const BINANCE_REST_URL: &str = "https://api.binance.com";

/// Source of a last-traded price
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn last_price(&self, symbol: &str) -> Result<Decimal>;
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// `GET /api/v3/ticker/price` lookup
pub struct BinancePriceLookup {
    client: reqwest::Client,
    base_url: String,
}

impl BinancePriceLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceLookup for BinancePriceLookup {
    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?;
        let ticker: TickerPrice = resp.json().await?;
        debug!("Live price for {}: {}", symbol, ticker.price);

        let price = ticker
            .price
            .parse::<Decimal>()
            .map_err(|e| PumpGateError::InvalidMarketData(format!("bad price '{}': {}", ticker.price, e)))?;
        if price <= Decimal::ZERO {
            return Err(PumpGateError::InvalidMarketData(format!(
                "non-positive price for {}",
                symbol
            )));
        }
        Ok(price)
    }
}
