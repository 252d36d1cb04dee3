//! Binance combined-stream wire format
//!
//! One combined stream carries three channels per symbol: the partial
//! order book (`@depth20@100ms`), aggregate trades (`@aggTrade`) and the 24h
//! ticker (`@ticker`). Payloads arrive wrapped as `{"stream": ..., "data": ...}`.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{OrderBookSnapshot, PriceLevel, TickerState, TradeTick};
use crate::error::{PumpGateError, Result};

/// Combined-stream endpoint
pub const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

const DEPTH_SUFFIX: &str = "@depth20@100ms";
const TRADE_SUFFIX: &str = "@aggTrade";
const TICKER_SUFFIX: &str = "@ticker";

/// Wrapper around every combined-stream payload
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    stream: String,
    data: serde_json::Value,
}

/// Partial book depth payload
#[derive(Debug, Deserialize)]
struct DepthPayload {
    #[serde(rename = "lastUpdateId")]
    #[allow(dead_code)]
    last_update_id: i64,
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

/// Aggregate trade payload
#[derive(Debug, Deserialize)]
struct AggTradePayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: i64,
    /// Buyer is the maker, i.e. the trade was sell-initiated
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

/// 24h ticker payload
#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "P")]
    price_change_pct: String,
    #[serde(rename = "q")]
    quote_volume: String,
}

/// A decoded market-data update
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Depth(OrderBookSnapshot),
    Trade(TradeTick),
    Ticker(TickerState),
}

impl StreamEvent {
    pub fn symbol(&self) -> &str {
        match self {
            StreamEvent::Depth(book) => &book.symbol,
            StreamEvent::Trade(tick) => &tick.symbol,
            StreamEvent::Ticker(ticker) => &ticker.symbol,
        }
    }
}

/// Stream names for one symbol
pub fn stream_names(symbol: &str) -> Vec<String> {
    let lower = symbol.to_lowercase();
    vec![
        format!("{}{}", lower, DEPTH_SUFFIX),
        format!("{}{}", lower, TRADE_SUFFIX),
        format!("{}{}", lower, TICKER_SUFFIX),
    ]
}

/// Combined-stream URL for a set of symbols
pub fn build_stream_url<'a>(base: &str, symbols: impl IntoIterator<Item = &'a String>) -> String {
    let streams: Vec<String> = symbols.into_iter().flat_map(|s| stream_names(s)).collect();
    format!("{}?streams={}", base, streams.join("/"))
}

/// Incremental SUBSCRIBE control message
pub fn subscribe_message(streams: &[String], id: u64) -> String {
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": streams,
        "id": id,
    })
    .to_string()
}

/// Bounded exponential backoff with ±25% jitter
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << exp).min(max);

    let jitter_range = delay.as_millis() as i64 / 4;
    if jitter_range == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    let millis = (delay.as_millis() as i64 + jitter).max(0) as u64;
    Duration::from_millis(millis)
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for control responses (`{"result":null,"id":1}`) and for
/// channels this collector does not track.
pub fn parse_stream_message(text: &str, received_at: DateTime<Utc>) -> Result<Option<StreamEvent>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("result").is_some() && value.get("id").is_some() {
        return Ok(None);
    }

    let envelope: StreamEnvelope = serde_json::from_value(value)?;
    let (symbol, channel) = envelope
        .stream
        .split_once('@')
        .ok_or_else(|| PumpGateError::InvalidMarketData(format!("bad stream name {}", envelope.stream)))?;
    let symbol = symbol.to_uppercase();

    if channel.starts_with("depth") {
        let depth: DepthPayload = serde_json::from_value(envelope.data)?;
        let bids = parse_levels(&depth.bids)?;
        let asks = parse_levels(&depth.asks)?;
        return Ok(Some(StreamEvent::Depth(OrderBookSnapshot::new(
            symbol,
            bids,
            asks,
            received_at,
        ))));
    }

    match channel {
        "aggTrade" => {
            let trade: AggTradePayload = serde_json::from_value(envelope.data)?;
            Ok(Some(StreamEvent::Trade(TradeTick {
                symbol: trade.symbol.to_uppercase(),
                price: parse_decimal(&trade.price)?,
                qty: parse_decimal(&trade.quantity)?,
                is_sell: trade.buyer_is_maker,
                timestamp: DateTime::from_timestamp_millis(trade.trade_time).unwrap_or(received_at),
            })))
        }
        "ticker" => {
            let ticker: TickerPayload = serde_json::from_value(envelope.data)?;
            Ok(Some(StreamEvent::Ticker(TickerState {
                symbol: ticker.symbol.to_uppercase(),
                last_price: parse_decimal(&ticker.last_price)?,
                quote_volume_24h: parse_f64(&ticker.quote_volume)?,
                price_change_pct: parse_f64(&ticker.price_change_pct)?,
                updated_at: DateTime::from_timestamp_millis(ticker.event_time).unwrap_or(received_at),
            })))
        }
        _ => Ok(None),
    }
}

fn parse_levels(raw: &[(String, String)]) -> Result<Vec<PriceLevel>> {
    raw.iter()
        .map(|(price, qty)| Ok(PriceLevel::new(parse_decimal(price)?, parse_decimal(qty)?)))
        .collect()
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    text.parse::<Decimal>()
        .map_err(|e| PumpGateError::InvalidMarketData(format!("bad decimal '{}': {}", text, e)))
}

fn parse_f64(text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|e| PumpGateError::InvalidMarketData(format!("bad number '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_depth() {
        let text = r#"{"stream":"btcusdt@depth20@100ms","data":{"lastUpdateId":160,"bids":[["100.0","1.5"],["99.5","2"]],"asks":[["100.5","1"],["101","0"]]}}"#;
        let event = parse_stream_message(text, Utc::now()).unwrap().unwrap();
        match event {
            StreamEvent::Depth(book) => {
                assert_eq!(book.symbol, "BTCUSDT");
                assert_eq!(book.best_bid(), Some(dec!(100.0)));
                // zero-qty ask dropped
                assert_eq!(book.asks.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_agg_trade() {
        let text = r#"{"stream":"ethusdt@aggTrade","data":{"e":"aggTrade","E":1700000000100,"s":"ETHUSDT","a":1,"p":"2000.5","q":"0.25","f":1,"l":1,"T":1700000000000,"m":true,"M":true}}"#;
        let event = parse_stream_message(text, Utc::now()).unwrap().unwrap();
        match event {
            StreamEvent::Trade(tick) => {
                assert_eq!(tick.symbol, "ETHUSDT");
                assert_eq!(tick.price, dec!(2000.5));
                assert!(tick.is_sell);
                assert_eq!(tick.timestamp.timestamp_millis(), 1_700_000_000_000);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_ticker() {
        let text = r#"{"stream":"solusdt@ticker","data":{"e":"24hrTicker","E":1700000000000,"s":"SOLUSDT","p":"1.5","P":"2.75","c":"56.1","v":"1000","q":"56100000.5"}}"#;
        let event = parse_stream_message(text, Utc::now()).unwrap().unwrap();
        match event {
            StreamEvent::Ticker(t) => {
                assert_eq!(t.last_price, dec!(56.1));
                assert!((t.quote_volume_24h - 56_100_000.5).abs() < 1e-6);
                assert!((t.price_change_pct - 2.75).abs() < 1e-9);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_control_response_ignored() {
        let event = parse_stream_message(r#"{"result":null,"id":3}"#, Utc::now()).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_malformed_message_is_error() {
        assert!(parse_stream_message("not json", Utc::now()).is_err());
        let bad_price = r#"{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"abc","q":"1","T":1,"m":false}}"#;
        assert!(parse_stream_message(bad_price, Utc::now()).is_err());
    }

    #[test]
    fn test_stream_url_and_subscribe() {
        let symbols = vec!["BTCUSDT".to_string()];
        let url = build_stream_url(BINANCE_STREAM_URL, &symbols);
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@depth20@100ms/btcusdt@aggTrade/btcusdt@ticker"
        );

        let msg: serde_json::Value =
            serde_json::from_str(&subscribe_message(&stream_names("ETHUSDT"), 7)).unwrap();
        assert_eq!(msg["method"], "SUBSCRIBE");
        assert_eq!(msg["id"], 7);
        assert_eq!(msg["params"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_reconnect_delay_bounded() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        for attempt in 1..40 {
            let d = reconnect_delay(attempt, base, max);
            assert!(d <= max + max / 4, "attempt {} gave {:?}", attempt, d);
        }
        let first = reconnect_delay(1, base, max);
        assert!(first >= Duration::from_millis(750) && first <= Duration::from_millis(1250));
    }
}
