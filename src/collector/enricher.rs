//! Live market state and point-in-time signal enrichment
//!
//! One ingestion task per process writes per-symbol state; readers take a
//! consistent snapshot. Order books and tickers are stored behind `Arc` and
//! replaced wholesale, so a reader never sees a half-applied update.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::binance_stream::{
    build_stream_url, parse_stream_message, reconnect_delay, stream_names, subscribe_message,
    StreamEvent, BINANCE_STREAM_URL,
};
use super::trade_ring::{TradeRing, DEFAULT_TRADE_CAPACITY};
use crate::adapters::{PriceLookup, BINANCE_REST_URL};
use crate::coordination::ShutdownListener;
use crate::domain::{
    checksum_of, EnrichedSignal, Enrichment, MarketSignal, OrderBookSnapshot, TickerState,
    TradeTick, STALE_AFTER_MS,
};
use crate::error::{PumpGateError, Result};

/// Spread reported when no live book is available (treated as maximally illiquid)
pub const FALLBACK_SPREAD_PCT: f64 = 1.0;

/// Window for the per-minute trade statistics
const TRADE_STATS_WINDOW_SECS: i64 = 60;

/// Market feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Combined-stream endpoint
    pub ws_url: String,
    /// REST endpoint for live price lookups
    pub rest_url: String,
    /// Symbols subscribed at startup
    pub symbols: Vec<String>,
    pub ping_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub trade_buffer_capacity: usize,
    /// Book age after which enrichment falls back to neutral defaults
    pub stale_after_ms: i64,
    /// Budget for a live price lookup when no book is cached
    pub price_lookup_timeout_ms: u64,
    /// Use the REST lookup at all
    pub live_price_lookup: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: BINANCE_STREAM_URL.to_string(),
            rest_url: BINANCE_REST_URL.to_string(),
            symbols: Vec::new(),
            ping_interval_secs: 30,
            connect_timeout_secs: 10,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 60_000,
            trade_buffer_capacity: DEFAULT_TRADE_CAPACITY,
            stale_after_ms: STALE_AFTER_MS,
            price_lookup_timeout_ms: 800,
            live_price_lookup: true,
        }
    }
}

/// Why the streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamExit {
    Closed,
    Shutdown,
}

/// Point-in-time market context for signals
pub struct MarketDataEnricher {
    config: FeedConfig,
    books: DashMap<String, Arc<OrderBookSnapshot>>,
    trades: DashMap<String, TradeRing>,
    tickers: DashMap<String, Arc<TickerState>>,
    /// Tracked symbols; also guards installation of the live command channel
    symbols: RwLock<BTreeSet<String>>,
    /// Streams to SUBSCRIBE on the live connection, when one exists
    live_tx: RwLock<Option<mpsc::UnboundedSender<Vec<String>>>>,
    symbols_changed: Notify,
    next_request_id: AtomicU64,
    price_lookup: Option<Arc<dyn PriceLookup>>,
}

impl MarketDataEnricher {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            books: DashMap::new(),
            trades: DashMap::new(),
            tickers: DashMap::new(),
            symbols: RwLock::new(BTreeSet::new()),
            live_tx: RwLock::new(None),
            symbols_changed: Notify::new(),
            next_request_id: AtomicU64::new(1),
            price_lookup: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FeedConfig::default())
    }

    /// Attach a live price source used when a symbol has no cached book
    pub fn with_price_lookup(mut self, lookup: Arc<dyn PriceLookup>) -> Self {
        self.price_lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    // ==================== Subscriptions ====================

    /// Track symbols on the live feed. Idempotent; returns the newly added ones.
    ///
    /// With a connection up, only the new streams are sent as an incremental
    /// SUBSCRIBE; otherwise they are picked up on the next connect.
    pub async fn subscribe<I, S>(&self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tracked = self.symbols.write().await;
        let added: Vec<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .filter(|s| tracked.insert(s.clone()))
            .collect();

        if added.is_empty() {
            return added;
        }

        info!("Subscribing to {:?}", added);
        if let Some(tx) = self.live_tx.read().await.as_ref() {
            let streams: Vec<String> = added.iter().flat_map(|s| stream_names(s)).collect();
            if tx.send(streams).is_err() {
                debug!("Live connection gone, new symbols wait for reconnect");
            }
        }
        drop(tracked);

        self.symbols_changed.notify_one();
        added
    }

    pub async fn tracked_symbols(&self) -> Vec<String> {
        self.symbols.read().await.iter().cloned().collect()
    }

    // ==================== Read accessors ====================

    pub fn get_orderbook(&self, symbol: &str) -> Option<Arc<OrderBookSnapshot>> {
        self.books.get(symbol).map(|b| Arc::clone(b.value()))
    }

    /// Last `n` trades for a symbol, oldest first
    pub fn get_recent_trades(&self, symbol: &str, n: usize) -> Vec<TradeTick> {
        self.trades
            .get(symbol)
            .map(|ring| ring.recent(n))
            .unwrap_or_default()
    }

    pub fn get_ticker(&self, symbol: &str) -> Option<Arc<TickerState>> {
        self.tickers.get(symbol).map(|t| Arc::clone(t.value()))
    }

    // ==================== Ingestion ====================

    /// Apply one decoded update. The ingestion task is the only caller in
    /// production.
    pub fn apply_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Depth(book) => {
                self.books.insert(book.symbol.clone(), Arc::new(book));
            }
            StreamEvent::Trade(tick) => {
                let capacity = self.config.trade_buffer_capacity;
                self.trades
                    .entry(tick.symbol.clone())
                    .or_insert_with(|| TradeRing::new(capacity))
                    .push(tick);
            }
            StreamEvent::Ticker(ticker) => {
                self.tickers.insert(ticker.symbol.clone(), Arc::new(ticker));
            }
        }
    }

    /// Decode and apply a raw text frame. Malformed frames are logged and dropped.
    pub fn apply_message(&self, text: &str) -> bool {
        match parse_stream_message(text, Utc::now()) {
            Ok(Some(event)) => {
                self.apply_event(event);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Dropping malformed market message: {} ({})", e, preview(text));
                false
            }
        }
    }

    // ==================== Enrichment ====================

    /// Attach live market context to a signal. Never fails: a missing or
    /// stale book yields bid = ask = signal price, spread 1.0, imbalance 0.0
    /// and `is_stale = true`.
    pub async fn enrich(&self, signal: &MarketSignal) -> EnrichedSignal {
        let started = Instant::now();
        let enriched_at = Utc::now();
        let symbol = signal.symbol.as_str();

        let book = self.get_orderbook(symbol);
        let live_book = book.as_ref().filter(|b| {
            b.age_ms(enriched_at) <= self.config.stale_after_ms
                && b.best_bid().is_some()
                && b.best_ask().is_some()
        });

        let (price, bid, ask, spread_pct, imbalance, is_stale) = match live_book {
            Some(b) => {
                let bid = b.best_bid().unwrap_or(signal.price);
                let ask = b.best_ask().unwrap_or(signal.price);
                let mid = b.mid_price().unwrap_or(signal.price);
                let spread = b.spread_pct().unwrap_or(FALLBACK_SPREAD_PCT);
                (mid, bid, ask, spread, b.imbalance(), false)
            }
            None => {
                let price = if book.is_none() {
                    self.lookup_price(signal).await
                } else {
                    debug!("Order book for {} is stale, using signal price", symbol);
                    signal.price
                };
                (price, signal.price, signal.price, FALLBACK_SPREAD_PCT, 0.0, true)
            }
        };

        let volume_24h = self
            .get_ticker(symbol)
            .map(|t| t.quote_volume_24h)
            .filter(|v| *v > 0.0)
            .unwrap_or(signal.volume_24h);

        let (trades_1m, buys_1m, sells_1m, avg_trade_size) = self.trade_stats(symbol, enriched_at);

        let market = Enrichment {
            price,
            bid,
            ask,
            spread_pct,
            imbalance,
            volume_24h,
            trades_1m,
            buys_1m,
            sells_1m,
            avg_trade_size,
            is_stale,
        };
        let checksum = enrichment_checksum(signal, &market);

        EnrichedSignal {
            signal: signal.clone(),
            market,
            enriched_at,
            latency_ms: started.elapsed().as_millis() as u64,
            checksum,
        }
    }

    /// Live price when nothing is cached, bounded by the lookup budget.
    /// Any failure falls back to the signal's own price.
    async fn lookup_price(&self, signal: &MarketSignal) -> Decimal {
        let lookup = match (&self.price_lookup, self.config.live_price_lookup) {
            (Some(lookup), true) => Arc::clone(lookup),
            _ => return signal.price,
        };

        let budget = Duration::from_millis(self.config.price_lookup_timeout_ms);
        match tokio::time::timeout(budget, lookup.last_price(&signal.symbol)).await {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                warn!("Price lookup for {} failed: {}", signal.symbol, e);
                signal.price
            }
            Err(_) => {
                warn!("Price lookup for {} timed out after {:?}", signal.symbol, budget);
                signal.price
            }
        }
    }

    /// (trades, buys, sells, average notional) over the last minute
    fn trade_stats(&self, symbol: &str, now: DateTime<Utc>) -> (u32, u32, u32, f64) {
        let Some(ring) = self.trades.get(symbol) else {
            return (0, 0, 0, 0.0);
        };
        let cutoff = now - ChronoDuration::seconds(TRADE_STATS_WINDOW_SECS);

        let mut trades = 0u32;
        let mut buys = 0u32;
        let mut sells = 0u32;
        let mut notional = Decimal::ZERO;
        for tick in ring.iter().filter(|t| t.timestamp >= cutoff && t.timestamp <= now) {
            trades += 1;
            if tick.is_sell {
                sells += 1;
            } else {
                buys += 1;
            }
            notional += tick.notional();
        }

        let avg = if trades == 0 {
            0.0
        } else {
            (notional / Decimal::from(trades)).to_f64().unwrap_or(0.0)
        };
        (trades, buys, sells, avg)
    }

    // ==================== Feed loop ====================

    /// Run the ingestion loop until shutdown. Transport errors reconnect with
    /// bounded exponential backoff; they never reach enrichment callers.
    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        let base = Duration::from_millis(self.config.reconnect_base_ms);
        let max_delay = Duration::from_millis(self.config.reconnect_max_ms);
        let mut attempt: u32 = 0;

        self.subscribe(self.config.symbols.clone()).await;
        info!("Starting market feed");

        loop {
            if shutdown.is_triggered() {
                break;
            }

            if self.symbols.read().await.is_empty() {
                debug!("No symbols tracked, waiting for a subscription");
                tokio::select! {
                    _ = self.symbols_changed.notified() => continue,
                    signal = shutdown.recv() => {
                        info!("Market feed stopping ({})", signal);
                        break;
                    }
                }
            }

            match self.connect_and_stream(&mut shutdown).await {
                Ok(StreamExit::Shutdown) => break,
                Ok(StreamExit::Closed) => {
                    info!("Market stream closed, reconnecting");
                    attempt = 1;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    error!("Market stream error (attempt {}): {}", attempt, e);
                }
            }

            let delay = reconnect_delay(attempt, base, max_delay);
            info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                signal = shutdown.recv() => {
                    info!("Market feed stopping ({})", signal);
                    break;
                }
            }
        }

        info!("Market feed stopped");
        Ok(())
    }

    async fn connect_and_stream(&self, shutdown: &mut ShutdownListener) -> Result<StreamExit> {
        let initial: BTreeSet<String> = self.symbols.read().await.clone();
        let url = build_stream_url(&self.config.ws_url, &initial);
        let url = Url::parse(&url)
            .map_err(|e| PumpGateError::Internal(format!("Invalid WebSocket URL: {}", e)))?;

        info!("Connecting to market stream ({} symbols)", initial.len());
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let connect = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
        let (ws_stream, _) = tokio::select! {
            res = connect => res
                .map_err(|_| PumpGateError::Internal("market stream connection timeout".to_string()))?
                .map_err(PumpGateError::WebSocket)?,
            _ = shutdown.recv() => return Ok(StreamExit::Shutdown),
        };
        info!("Connected to market stream");

        let (mut write, mut read) = ws_stream.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Vec<String>>();

        // Install the command channel under the symbol lock so a concurrent
        // subscribe is either in `initial`, in `late`, or sent through the channel.
        {
            let tracked = self.symbols.read().await;
            let late: Vec<String> = tracked
                .difference(&initial)
                .flat_map(|s| stream_names(s))
                .collect();
            *self.live_tx.write().await = Some(cmd_tx);
            if !late.is_empty() {
                let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
                write.send(Message::Text(subscribe_message(&late, id))).await?;
            }
        }

        let mut ping_interval =
            tokio::time::interval(Duration::from_secs(self.config.ping_interval_secs.max(1)));
        ping_interval.tick().await;

        let exit = loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.apply_message(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Received close frame");
                            break Ok(StreamExit::Closed);
                        }
                        Some(Err(e)) => {
                            break Err(PumpGateError::WebSocket(e));
                        }
                        None => {
                            info!("Stream ended");
                            break Ok(StreamExit::Closed);
                        }
                        _ => {}
                    }
                }
                Some(streams) = cmd_rx.recv() => {
                    let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
                    debug!("SUBSCRIBE {:?} (id {})", streams, id);
                    if let Err(e) = write.send(Message::Text(subscribe_message(&streams, id))).await {
                        break Err(PumpGateError::WebSocket(e));
                    }
                }
                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!("Failed to send ping: {}", e);
                        break Ok(StreamExit::Closed);
                    }
                    debug!("Sent ping");
                }
                signal = shutdown.recv() => {
                    info!("Closing market stream ({})", signal);
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(StreamExit::Shutdown);
                }
            }
        };

        *self.live_tx.write().await = None;
        exit
    }
}

#[derive(Serialize)]
struct CanonicalEnrichment<'a> {
    signal: &'a MarketSignal,
    market: &'a Enrichment,
}

/// Content hash over (signal, enrichment). Excludes `enriched_at` and
/// `latency_ms`, so re-enriching unchanged state yields the same checksum.
fn enrichment_checksum(signal: &MarketSignal, market: &Enrichment) -> String {
    checksum_of(&CanonicalEnrichment { signal, market }).unwrap_or_else(|e| {
        warn!("Failed to checksum enrichment for {}: {}", signal.symbol, e);
        String::new()
    })
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(100)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}
