use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::MarketSignal;

/// Order book age after which a snapshot no longer counts as live
pub const STALE_AFTER_MS: i64 = 5_000;

/// Levels used for the imbalance calculation
pub const IMBALANCE_LEVELS: usize = 10;

/// One price level of the book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}

/// Point-in-time order book for a symbol.
///
/// Bids are ordered best (highest) first, asks best (lowest) first. A
/// snapshot is never patched in place; each depth message yields a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub captured_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Build a snapshot, sorting levels and dropping empty ones
    pub fn new(
        symbol: impl Into<String>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        bids.retain(|l| l.qty > Decimal::ZERO && l.price > Decimal::ZERO);
        asks.retain(|l| l.qty > Decimal::ZERO && l.price > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            symbol: symbol.into(),
            bids,
            asks,
            captured_at,
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Spread as a percentage of mid price
    pub fn spread_pct(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let mid = self.mid_price()?;
        if mid.is_zero() {
            return None;
        }
        ((ask - bid) / mid * Decimal::from(100)).to_f64()
    }

    /// Notional-weighted imbalance over the top levels.
    /// (bid_notional - ask_notional) / (bid_notional + ask_notional), in [-1, 1].
    pub fn imbalance(&self) -> f64 {
        let bid_notional: Decimal = self
            .bids
            .iter()
            .take(IMBALANCE_LEVELS)
            .map(PriceLevel::notional)
            .sum();
        let ask_notional: Decimal = self
            .asks
            .iter()
            .take(IMBALANCE_LEVELS)
            .map(PriceLevel::notional)
            .sum();
        let total = bid_notional + ask_notional;
        if total.is_zero() {
            return 0.0;
        }
        ((bid_notional - ask_notional) / total)
            .to_f64()
            .unwrap_or(0.0)
            .clamp(-1.0, 1.0)
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.captured_at).num_milliseconds()
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_ms(now) > STALE_AFTER_MS
    }
}

/// Single aggregated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price: Decimal,
    pub qty: Decimal,
    /// Sell-initiated (buyer was the maker)
    pub is_sell: bool,
    pub timestamp: DateTime<Utc>,
}

impl TradeTick {
    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}

/// 24h rolling ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerState {
    pub symbol: String,
    pub last_price: Decimal,
    /// 24h volume in quote currency
    pub quote_volume_24h: f64,
    pub price_change_pct: f64,
    pub updated_at: DateTime<Utc>,
}

/// Market context attached to a signal at enrichment time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub spread_pct: f64,
    pub imbalance: f64,
    pub volume_24h: f64,
    pub trades_1m: u32,
    pub buys_1m: u32,
    pub sells_1m: u32,
    pub avg_trade_size: f64,
    pub is_stale: bool,
}

/// Signal plus market context. Built once per enrichment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSignal {
    pub signal: MarketSignal,
    #[serde(flatten)]
    pub market: Enrichment,
    pub enriched_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub checksum: String,
}

impl EnrichedSignal {
    pub fn symbol(&self) -> &str {
        &self.signal.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(now: DateTime<Utc>) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            "BTCUSDT",
            vec![
                PriceLevel::new(dec!(99), dec!(1)),
                PriceLevel::new(dec!(100), dec!(2)),
            ],
            vec![
                PriceLevel::new(dec!(102), dec!(1)),
                PriceLevel::new(dec!(101), dec!(1)),
            ],
            now,
        )
    }

    #[test]
    fn test_levels_sorted_best_first() {
        let b = book(Utc::now());
        assert_eq!(b.best_bid(), Some(dec!(100)));
        assert_eq!(b.best_ask(), Some(dec!(101)));
        assert_eq!(b.mid_price(), Some(dec!(100.5)));
    }

    #[test]
    fn test_spread_pct() {
        let b = book(Utc::now());
        let spread = b.spread_pct().unwrap();
        assert!((spread - 100.0 / 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_imbalance_notional_weighted() {
        let b = book(Utc::now());
        // bids: 200 + 99 = 299, asks: 101 + 102 = 203
        let expected = (299.0 - 203.0) / (299.0 + 203.0);
        assert!((b.imbalance() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_imbalance_empty_book_is_neutral() {
        let b = OrderBookSnapshot::new("X", vec![], vec![], Utc::now());
        assert_eq!(b.imbalance(), 0.0);
        assert!(b.spread_pct().is_none());
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let b = book(now - chrono::Duration::seconds(6));
        assert!(b.is_stale(now));
        let fresh = book(now - chrono::Duration::seconds(4));
        assert!(!fresh.is_stale(now));
    }
}
