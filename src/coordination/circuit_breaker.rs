//! Loss Circuit Breaker
//!
//! Process-wide state machine that blocks trading after loss patterns,
//! independent of any individual signal.
//!
//! CLOSED -> OPEN on consecutive losses, daily loss count or daily loss %
//! (checked in that order after every loss). OPEN -> HALF_OPEN lazily on the
//! first `can_trade` after the cooldown. HALF_OPEN -> CLOSED after enough
//! uninterrupted recovery wins. A HALF_OPEN loss only resets recovery
//! progress; HALF_OPEN -> OPEN happens when `half_open_max_trades` outcomes
//! are spent without recovering, whether the outcome that spends the budget
//! is a win or a loss. Operators can force OPEN from any state.
//!
//! All state lives behind one mutex so a `can_trade` and a `record_outcome`
//! never interleave.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Losses kept for audit
pub const LOSS_HISTORY_CAPACITY: usize = 100;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all trades allowed
    Closed,
    /// Loss threshold exceeded - trades blocked
    Open,
    /// Recovery period - limited test trades
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for the loss circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub max_consecutive_losses: u32,
    pub max_daily_losses: u32,
    /// Cumulative loss (sum of per-trade loss %) per UTC day
    pub max_daily_loss_pct: f64,
    /// Time in OPEN before a HALF_OPEN probe is allowed
    pub cooldown_secs: u64,
    /// Trades admitted while HALF_OPEN (0 = unlimited)
    pub half_open_max_trades: u32,
    pub recovery_wins_required: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3,
            max_daily_losses: 5,
            max_daily_loss_pct: 5.0,
            cooldown_secs: 1_800, // 30 minutes
            half_open_max_trades: 3,
            recovery_wins_required: 2,
        }
    }
}

/// Trip reasons for the circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripReason {
    ConsecutiveLosses { count: u32 },
    DailyLossCount { count: u32 },
    DailyLossPct { pct: f64 },
    HalfOpenExhausted { trades: u32, wins: u32 },
    Manual { reason: String },
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripReason::ConsecutiveLosses { count } => write!(f, "{} consecutive losses", count),
            TripReason::DailyLossCount { count } => write!(f, "{} losses today", count),
            TripReason::DailyLossPct { pct } => write!(f, "daily loss {:.2}%", pct),
            TripReason::HalfOpenExhausted { trades, wins } => {
                write!(f, "half-open budget spent: {} trades, {} recovery wins", trades, wins)
            }
            TripReason::Manual { reason } => write!(f, "manual: {}", reason),
        }
    }
}

/// One recorded loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub symbol: String,
    pub loss_pct: f64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Mutable breaker state
#[derive(Debug, Clone)]
pub struct BreakerState {
    pub state: CircuitState,
    pub last_transition: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub daily_losses: u32,
    pub daily_loss_pct: f64,
    pub trading_day: NaiveDate,
    pub half_open_trade_count: u32,
    pub half_open_outcomes: u32,
    pub recovery_wins: u32,
    pub loss_history: VecDeque<LossRecord>,
    pub last_trip_reason: Option<TripReason>,
    pub total_trips: u64,
}

impl BreakerState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            last_transition: now,
            opened_at: None,
            consecutive_losses: 0,
            daily_losses: 0,
            daily_loss_pct: 0.0,
            trading_day: now.date_naive(),
            half_open_trade_count: 0,
            half_open_outcomes: 0,
            recovery_wins: 0,
            loss_history: VecDeque::with_capacity(LOSS_HISTORY_CAPACITY),
            last_trip_reason: None,
            total_trips: 0,
        }
    }

    fn reset_half_open(&mut self) {
        self.half_open_trade_count = 0;
        self.half_open_outcomes = 0;
        self.recovery_wins = 0;
    }
}

/// Serialisable snapshot for introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub last_transition: DateTime<Utc>,
    pub consecutive_losses: u32,
    pub daily_losses: u32,
    pub daily_loss_pct: f64,
    pub half_open_trade_count: u32,
    pub recovery_wins: u32,
    /// Seconds until a HALF_OPEN probe is allowed, when OPEN
    pub cooldown_remaining_secs: Option<u64>,
    pub last_trip_reason: Option<TripReason>,
    pub total_trips: u64,
    pub recent_losses: Vec<LossRecord>,
}

/// Circuit breaker over realised trade outcomes
pub struct LossCircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl LossCircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::new(Utc::now())),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Whether a trade may be released now.
    ///
    /// Side-effecting: performs the lazy OPEN -> HALF_OPEN check and reserves
    /// a half-open trade slot when it returns `true`.
    pub async fn can_trade(&self) -> bool {
        self.can_trade_at(Utc::now()).await
    }

    pub async fn can_trade_at(&self, now: DateTime<Utc>) -> bool {
        let mut s = self.inner.lock().await;
        self.roll_day(&mut s, now);

        match s.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = match s.opened_at {
                    Some(at) => at,
                    None => {
                        // Unknown trip time: restart the cooldown
                        s.opened_at = Some(now);
                        now
                    }
                };
                let elapsed = now.signed_duration_since(opened_at).num_seconds();
                if elapsed >= 0 && elapsed as u64 >= self.config.cooldown_secs {
                    s.state = CircuitState::HalfOpen;
                    s.last_transition = now;
                    s.reset_half_open();
                    info!("Circuit breaker transitioning to HALF_OPEN after {}s", elapsed);
                    self.reserve_half_open(&mut s)
                } else {
                    debug!(
                        "Circuit open, {}s until recovery",
                        self.config.cooldown_secs.saturating_sub(elapsed.max(0) as u64)
                    );
                    false
                }
            }
            CircuitState::HalfOpen => self.reserve_half_open(&mut s),
        }
    }

    fn reserve_half_open(&self, s: &mut BreakerState) -> bool {
        if self.config.half_open_max_trades > 0
            && s.half_open_trade_count >= self.config.half_open_max_trades
        {
            debug!("HALF_OPEN trade limit reached");
            return false;
        }
        s.half_open_trade_count += 1;
        true
    }

    /// Record a realised outcome. `loss_pct` is the loss magnitude in percent
    /// and is ignored for wins.
    pub async fn record_outcome(&self, win: bool, loss_pct: f64, symbol: &str, reason: &str) {
        self.record_outcome_at(win, loss_pct, symbol, reason, Utc::now())
            .await
    }

    pub async fn record_outcome_at(
        &self,
        win: bool,
        loss_pct: f64,
        symbol: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let mut s = self.inner.lock().await;
        self.roll_day(&mut s, now);

        if win {
            s.consecutive_losses = 0;
        } else {
            let loss_pct = if loss_pct.is_finite() { loss_pct.abs() } else { 0.0 };
            s.consecutive_losses += 1;
            s.daily_losses += 1;
            s.daily_loss_pct += loss_pct;
            if s.loss_history.len() >= LOSS_HISTORY_CAPACITY {
                s.loss_history.pop_front();
            }
            s.loss_history.push_back(LossRecord {
                symbol: symbol.to_string(),
                loss_pct,
                reason: reason.to_string(),
                at: now,
            });
            warn!(
                "Loss #{} on {} ({:.2}%): {}",
                s.consecutive_losses, symbol, loss_pct, reason
            );
        }

        match s.state {
            CircuitState::Closed if !win => {
                if let Some(trip) = self.loss_trip(&s) {
                    Self::trip(&mut s, trip, now);
                }
            }
            // A loss never re-opens by itself; only the spent outcome budget does
            CircuitState::HalfOpen => {
                s.half_open_outcomes += 1;
                if win {
                    s.recovery_wins += 1;
                } else {
                    s.recovery_wins = 0;
                }

                if s.recovery_wins >= self.config.recovery_wins_required {
                    s.state = CircuitState::Closed;
                    s.last_transition = now;
                    s.opened_at = None;
                    s.consecutive_losses = 0;
                    s.reset_half_open();
                    info!("Circuit breaker CLOSED - normal operation resumed");
                } else if self.config.half_open_max_trades > 0
                    && s.half_open_outcomes >= self.config.half_open_max_trades
                {
                    let trip = TripReason::HalfOpenExhausted {
                        trades: s.half_open_outcomes,
                        wins: s.recovery_wins,
                    };
                    Self::trip(&mut s, trip, now);
                }
            }
            _ => {}
        }
    }

    /// Highest-priority loss threshold that is met, if any
    fn loss_trip(&self, s: &BreakerState) -> Option<TripReason> {
        let cfg = &self.config;
        if s.consecutive_losses >= cfg.max_consecutive_losses {
            Some(TripReason::ConsecutiveLosses {
                count: s.consecutive_losses,
            })
        } else if s.daily_losses >= cfg.max_daily_losses {
            Some(TripReason::DailyLossCount {
                count: s.daily_losses,
            })
        } else if s.daily_loss_pct >= cfg.max_daily_loss_pct {
            Some(TripReason::DailyLossPct {
                pct: s.daily_loss_pct,
            })
        } else {
            None
        }
    }

    fn trip(s: &mut BreakerState, reason: TripReason, now: DateTime<Utc>) {
        warn!("Circuit breaker TRIPPED ({} -> OPEN): {}", s.state, reason);
        s.state = CircuitState::Open;
        s.last_transition = now;
        s.opened_at = Some(now);
        s.reset_half_open();
        s.last_trip_reason = Some(reason);
        s.total_trips += 1;
    }

    /// Operator override: OPEN from any state, restarting the cooldown
    pub async fn force_open(&self, reason: &str) {
        let mut s = self.inner.lock().await;
        Self::trip(
            &mut s,
            TripReason::Manual {
                reason: reason.to_string(),
            },
            Utc::now(),
        );
    }

    /// Operator override: CLOSED, clearing loss streak and half-open progress.
    /// Daily counters are kept.
    pub async fn force_close(&self, reason: &str) {
        let mut s = self.inner.lock().await;
        s.state = CircuitState::Closed;
        s.last_transition = Utc::now();
        s.opened_at = None;
        s.consecutive_losses = 0;
        s.reset_half_open();
        warn!("Circuit breaker force-closed: {}", reason);
    }

    pub async fn get_status(&self) -> BreakerStatus {
        self.get_status_at(Utc::now()).await
    }

    pub async fn get_status_at(&self, now: DateTime<Utc>) -> BreakerStatus {
        let mut s = self.inner.lock().await;
        self.roll_day(&mut s, now);

        let cooldown_remaining_secs = match (s.state, s.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = now.signed_duration_since(at).num_seconds().max(0) as u64;
                Some(self.config.cooldown_secs.saturating_sub(elapsed))
            }
            (CircuitState::Open, None) => Some(self.config.cooldown_secs),
            _ => None,
        };

        BreakerStatus {
            state: s.state,
            last_transition: s.last_transition,
            consecutive_losses: s.consecutive_losses,
            daily_losses: s.daily_losses,
            daily_loss_pct: s.daily_loss_pct,
            half_open_trade_count: s.half_open_trade_count,
            recovery_wins: s.recovery_wins,
            cooldown_remaining_secs,
            last_trip_reason: s.last_trip_reason.clone(),
            total_trips: s.total_trips,
            recent_losses: s.loss_history.iter().cloned().collect(),
        }
    }

    /// Reset daily counters on UTC date change
    fn roll_day(&self, s: &mut BreakerState, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != s.trading_day {
            debug!(
                "New trading day {}: resetting {} daily losses ({:.2}%)",
                today, s.daily_losses, s.daily_loss_pct
            );
            s.trading_day = today;
            s.daily_losses = 0;
            s.daily_loss_pct = 0.0;
        }
    }
}
