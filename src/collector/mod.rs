//! Market data collection and enrichment
//!
//! Streams Binance order book, trade and ticker channels into per-symbol
//! state and attaches that state to incoming signals.

mod binance_stream;
mod enricher;
mod trade_ring;

pub use binance_stream::*;
pub use enricher::{FeedConfig, MarketDataEnricher, FALLBACK_SPREAD_PCT};
pub use trade_ring::{TradeRing, DEFAULT_TRADE_CAPACITY};
