//! Adaptive take-profit / stop-loss / position sizing
//!
//! Base TP/SL come from the routed mode envelope and are scaled by four
//! independent factors (volatility, momentum, regime, signal strength).
//! SL only follows volatility. A plan never leaves with R:R below the
//! configured minimum; TP is raised to get there, SL is never lowered.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{ModeDecision, TargetOutcome, TargetPlan};

/// Broad market (BTC) trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Bullish,
    Bearish,
    #[default]
    Sideways,
}

/// Market context for a target calculation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketContext {
    /// ATR as a percentage of price
    pub atr_pct: Option<f64>,
    pub rsi: Option<f64>,
    pub regime: MarketRegime,
}

/// Target engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// ATR level at which volatility factor is 1.0
    pub reference_atr_pct: f64,
    pub regime_bullish: f64,
    pub regime_bearish: f64,
    pub regime_sideways: f64,
    pub min_tp_pct: f64,
    pub max_tp_pct: f64,
    pub min_sl_pct: f64,
    pub max_sl_pct: f64,
    pub min_rr_ratio: f64,
    pub size_high_confidence_usd: f64,
    pub size_medium_confidence_usd: f64,
    pub size_low_confidence_usd: f64,
    /// Multiplier once `loss_streak_threshold` consecutive losses are reported
    pub loss_streak_factor: f64,
    pub loss_streak_threshold: u32,
    pub min_position_usd: f64,
    pub max_daily_exposure_usd: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            reference_atr_pct: 2.0,
            regime_bullish: 1.2,
            regime_bearish: 0.8,
            regime_sideways: 1.0,
            min_tp_pct: 0.5,
            max_tp_pct: 25.0,
            min_sl_pct: 0.3,
            max_sl_pct: 10.0,
            min_rr_ratio: 1.5,
            size_high_confidence_usd: 100.0,
            size_medium_confidence_usd: 60.0,
            size_low_confidence_usd: 30.0,
            loss_streak_factor: 0.5,
            loss_streak_threshold: 2,
            min_position_usd: 10.0,
            max_daily_exposure_usd: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DailyExposure {
    date: Option<NaiveDate>,
    used_usd: f64,
}

/// Volatility/momentum/regime/strength-adjusted targets
pub struct AdaptiveTargetEngine {
    config: TargetConfig,
    consecutive_losses: AtomicU32,
    exposure: RwLock<DailyExposure>,
}

impl AdaptiveTargetEngine {
    pub fn new(config: TargetConfig) -> Self {
        Self {
            config,
            consecutive_losses: AtomicU32::new(0),
            exposure: RwLock::new(DailyExposure::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TargetConfig::default())
    }

    // ==================== Factors ====================

    /// ATR relative to the reference level, clamped to [0.5, 2.0]
    pub fn volatility_factor(&self, atr_pct: Option<f64>) -> f64 {
        match atr_pct {
            Some(atr) if atr > 0.0 && self.config.reference_atr_pct > 0.0 => {
                (atr / self.config.reference_atr_pct).clamp(0.5, 2.0)
            }
            _ => 1.0,
        }
    }

    /// Stepped multiplier from RSI bands
    pub fn momentum_factor(&self, rsi: Option<f64>) -> f64 {
        match rsi {
            Some(r) if r >= 80.0 => 0.8,
            Some(r) if r >= 70.0 => 0.9,
            Some(r) if r >= 50.0 => 1.1,
            Some(r) if r >= 30.0 => 1.0,
            Some(_) => 0.9,
            None => 1.0,
        }
    }

    pub fn regime_factor(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bullish => self.config.regime_bullish,
            MarketRegime::Bearish => self.config.regime_bearish,
            MarketRegime::Sideways => self.config.regime_sideways,
        }
    }

    /// Linear in confidence, [0.8, 1.2]
    pub fn strength_factor(&self, confidence: f64) -> f64 {
        0.8 + 0.4 * confidence.clamp(0.0, 1.0)
    }

    // ==================== Calculation ====================

    /// Compute a plan for a routed signal. SKIP routes and exhausted daily
    /// exposure are `NoTrade`. A `Trade` plan has already booked its size
    /// against today's exposure; a caller that does not act on it must hand
    /// the size back with [`release_exposure`](Self::release_exposure).
    pub async fn calculate(&self, mode: &ModeDecision, ctx: &MarketContext) -> TargetOutcome<TargetPlan> {
        if !mode.mode.is_tradeable() {
            return TargetOutcome::no_trade("mode is SKIP");
        }
        let base_tp = mode.config.target_pct;
        let base_sl = mode.config.stop_pct;
        if base_tp <= 0.0 || base_sl <= 0.0 {
            return TargetOutcome::no_trade(format!("{} envelope has no target", mode.mode));
        }

        let vol = self.volatility_factor(ctx.atr_pct);
        let momentum = self.momentum_factor(ctx.rsi);
        let regime = self.regime_factor(ctx.regime);
        let strength = self.strength_factor(mode.confidence);

        let cfg = &self.config;
        let mut tp = (base_tp * vol * momentum * regime * strength).clamp(cfg.min_tp_pct, cfg.max_tp_pct);
        let sl = (base_sl * vol).clamp(cfg.min_sl_pct, cfg.max_sl_pct);

        let mut rr_forced = false;
        if tp / sl < cfg.min_rr_ratio {
            tp = sl * cfg.min_rr_ratio;
            rr_forced = true;
        }
        let rr_ratio = tp / sl;

        let size = match self.reserve_position(mode.confidence).await {
            Some(size) => size,
            None => return TargetOutcome::no_trade("daily exposure exhausted"),
        };

        let mut factors = format!(
            "base {:.2}/{:.2} vol x{:.2} momentum x{:.2} regime x{:.2} strength x{:.2}",
            base_tp, base_sl, vol, momentum, regime, strength
        );
        if rr_forced {
            factors.push_str(&format!(" tp raised to R:R {:.2}", cfg.min_rr_ratio));
        }

        debug!("{} plan: tp {:.2}% sl {:.2}% size ${:.2}", mode.mode, tp, sl, size);
        TargetOutcome::Trade(TargetPlan {
            tp_pct: tp,
            sl_pct: sl,
            rr_ratio,
            position_size_usd: size,
            confidence: mode.confidence,
            factors,
        })
    }

    /// Confidence-tiered size, reduced on a loss streak, capped by remaining
    /// daily exposure, floored at the minimum and booked. Sizing and booking
    /// happen under one write guard so concurrent plans cannot overspend the
    /// budget. `None` when even the floor no longer fits.
    async fn reserve_position(&self, confidence: f64) -> Option<f64> {
        let cfg = &self.config;
        let mut size = if confidence >= 0.8 {
            cfg.size_high_confidence_usd
        } else if confidence >= 0.6 {
            cfg.size_medium_confidence_usd
        } else {
            cfg.size_low_confidence_usd
        };

        if self.consecutive_losses.load(Ordering::SeqCst) >= cfg.loss_streak_threshold {
            size *= cfg.loss_streak_factor;
        }

        let mut exposure = self.exposure.write().await;
        Self::roll_day(&mut exposure);
        let remaining = (cfg.max_daily_exposure_usd - exposure.used_usd).max(0.0);
        if remaining < cfg.min_position_usd {
            return None;
        }
        let size = size.max(cfg.min_position_usd).min(remaining);
        exposure.used_usd += size;
        Some(size)
    }

    // ==================== Feedback ====================

    /// Externally reported trade result
    pub fn record_trade_result(&self, win: bool) {
        if win {
            self.consecutive_losses.store(0, Ordering::SeqCst);
        } else {
            let losses = self.consecutive_losses.fetch_add(1, Ordering::SeqCst) + 1;
            if losses >= self.config.loss_streak_threshold {
                info!("{} consecutive losses, reducing position size", losses);
            }
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses.load(Ordering::SeqCst)
    }

    /// Return a booked plan size that was never executed
    pub async fn release_exposure(&self, usd: f64) {
        let mut exposure = self.exposure.write().await;
        Self::roll_day(&mut exposure);
        exposure.used_usd = (exposure.used_usd - usd.max(0.0)).max(0.0);
    }

    pub async fn remaining_exposure(&self) -> f64 {
        let mut exposure = self.exposure.write().await;
        Self::roll_day(&mut exposure);
        (self.config.max_daily_exposure_usd - exposure.used_usd).max(0.0)
    }

    fn roll_day(exposure: &mut DailyExposure) {
        let today = Utc::now().date_naive();
        if exposure.date != Some(today) {
            exposure.date = Some(today);
            exposure.used_usd = 0.0;
        }
    }
}
