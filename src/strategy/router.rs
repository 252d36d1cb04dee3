//! Trading-mode router
//!
//! Ordered threshold rules, first match wins:
//! 1. extreme buys/sec from the buys-per-sec detector (override)
//! 2. SUPER_SCALP
//! 3. SCALP
//! 4. SWING
//! 5. SKIP

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    normalize_tag, EnrichedSignal, MarketSignal, ModeConfig, ModeDecision, TradingMode,
};

/// Confidence ceiling for every routed mode
const MAX_CONFIDENCE: f64 = 0.95;

/// Minimums a signal must meet for a tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub min_delta_pct: f64,
    pub min_buys_per_sec: f64,
    pub min_vol_raise_pct: f64,
    pub min_volume_24h: f64,
    /// Confidence when the minimums are just met
    pub base_confidence: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            min_delta_pct: 0.0,
            min_buys_per_sec: 0.0,
            min_vol_raise_pct: 0.0,
            min_volume_24h: 0.0,
            base_confidence: 0.5,
        }
    }
}

/// Router thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub override_buys_per_sec: f64,
    /// Strategy tag of the high-frequency buy detector
    pub override_strategy: String,
    pub super_scalp: TierThresholds,
    pub scalp: TierThresholds,
    pub swing: TierThresholds,
    /// Strategy families that get a SWING confidence boost
    pub trend_families: Vec<String>,
    pub trend_boost: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            override_buys_per_sec: 500.0,
            override_strategy: "BuysPerSec".to_string(),
            super_scalp: TierThresholds {
                min_delta_pct: 10.0,
                min_buys_per_sec: 20.0,
                min_vol_raise_pct: 100.0,
                min_volume_24h: 0.0,
                base_confidence: 0.8,
            },
            scalp: TierThresholds {
                min_delta_pct: 5.0,
                min_buys_per_sec: 5.0,
                min_vol_raise_pct: 50.0,
                min_volume_24h: 10_000_000.0,
                base_confidence: 0.7,
            },
            swing: TierThresholds {
                min_delta_pct: 3.0,
                min_buys_per_sec: 0.0,
                min_vol_raise_pct: 0.0,
                min_volume_24h: 50_000_000.0,
                base_confidence: 0.6,
            },
            trend_families: vec!["trend".to_string(), "breakout".to_string()],
            trend_boost: 0.15,
        }
    }
}

/// Risk envelope per mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub super_scalp: ModeConfig,
    pub scalp: ModeConfig,
    pub swing: ModeConfig,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            super_scalp: ModeConfig::super_scalp(),
            scalp: ModeConfig::scalp(),
            swing: ModeConfig::swing(),
        }
    }
}

impl ModesConfig {
    pub fn for_mode(&self, mode: TradingMode) -> ModeConfig {
        match mode {
            TradingMode::SuperScalp => self.super_scalp.clone(),
            TradingMode::Scalp => self.scalp.clone(),
            TradingMode::Swing => self.swing.clone(),
            TradingMode::Skip => ModeConfig::skip(),
        }
    }
}

/// Fields the router looks at
#[derive(Debug, Clone, Copy)]
struct RouteInputs<'a> {
    strategy: &'a str,
    delta_pct: f64,
    buys_per_sec: f64,
    vol_raise_pct: f64,
    volume_24h: f64,
}

/// Stateless mode router; the single place mode envelopes are selected
#[derive(Debug, Clone)]
pub struct SignalRouter {
    config: RouterConfig,
    modes: ModesConfig,
}

impl SignalRouter {
    pub fn new(config: RouterConfig, modes: ModesConfig) -> Self {
        Self { config, modes }
    }

    pub fn with_defaults() -> Self {
        Self::new(RouterConfig::default(), ModesConfig::default())
    }

    /// Route a raw signal on its own fields
    pub fn route(&self, signal: &MarketSignal) -> ModeDecision {
        let strategy = signal.strategy_key();
        self.route_inputs(RouteInputs {
            strategy: &strategy,
            delta_pct: signal.delta_pct,
            buys_per_sec: signal.buys_per_sec,
            vol_raise_pct: signal.vol_raise_pct,
            volume_24h: signal.volume_24h,
        })
    }

    /// Route an enriched signal, using the live 24h volume
    pub fn route_enriched(&self, enriched: &EnrichedSignal) -> ModeDecision {
        let signal = &enriched.signal;
        let strategy = signal.strategy_key();
        self.route_inputs(RouteInputs {
            strategy: &strategy,
            delta_pct: signal.delta_pct,
            buys_per_sec: signal.buys_per_sec,
            vol_raise_pct: signal.vol_raise_pct,
            volume_24h: enriched.market.volume_24h,
        })
    }

    fn route_inputs(&self, inputs: RouteInputs<'_>) -> ModeDecision {
        let cfg = &self.config;

        // 1. Override: extreme buy pressure from the buys/sec detector
        if inputs.buys_per_sec >= cfg.override_buys_per_sec
            && inputs.strategy == normalize_tag(&cfg.override_strategy)
        {
            let confidence = (0.6 + inputs.buys_per_sec / 2500.0).min(MAX_CONFIDENCE);
            return self.decision(
                TradingMode::SuperScalp,
                confidence,
                vec![format!(
                    "override: {:.0} buys/s >= {:.0} from {}",
                    inputs.buys_per_sec, cfg.override_buys_per_sec, cfg.override_strategy
                )],
            );
        }

        let mut failures = Vec::new();

        // 2-4. Tiers, strictest first
        for (mode, tier) in [
            (TradingMode::SuperScalp, &cfg.super_scalp),
            (TradingMode::Scalp, &cfg.scalp),
            (TradingMode::Swing, &cfg.swing),
        ] {
            let failed = failed_minimums(mode, tier, &inputs);
            if failed.is_empty() {
                let mut confidence = tier_confidence(tier, inputs.delta_pct);
                let mut reasons = vec![format!(
                    "{}: delta {:.2}% buys {:.1}/s vol_raise {:.0}% vol_24h {:.0}",
                    mode, inputs.delta_pct, inputs.buys_per_sec, inputs.vol_raise_pct, inputs.volume_24h
                )];
                if mode == TradingMode::Swing && self.is_trend_family(inputs.strategy) {
                    confidence = (confidence + cfg.trend_boost).min(MAX_CONFIDENCE);
                    reasons.push(format!("trend family boost +{:.2}", cfg.trend_boost));
                }
                return self.decision(mode, confidence, reasons);
            }
            failures.extend(failed);
        }

        // 5. Nothing qualified
        debug!("Routing to SKIP: {:?}", failures);
        self.decision(TradingMode::Skip, 0.0, failures)
    }

    fn is_trend_family(&self, strategy: &str) -> bool {
        self.config
            .trend_families
            .iter()
            .map(|f| normalize_tag(f))
            .any(|f| !f.is_empty() && strategy.contains(&f))
    }

    fn decision(&self, mode: TradingMode, confidence: f64, reasons: Vec<String>) -> ModeDecision {
        ModeDecision {
            mode,
            confidence,
            reasons,
            config: self.modes.for_mode(mode),
        }
    }
}

fn failed_minimums(mode: TradingMode, tier: &TierThresholds, inputs: &RouteInputs<'_>) -> Vec<String> {
    let mut failed = Vec::new();
    for (name, value, min) in [
        ("delta", inputs.delta_pct, tier.min_delta_pct),
        ("buys/s", inputs.buys_per_sec, tier.min_buys_per_sec),
        ("vol_raise", inputs.vol_raise_pct, tier.min_vol_raise_pct),
        ("vol_24h", inputs.volume_24h, tier.min_volume_24h),
    ] {
        if min > 0.0 && value < min {
            failed.push(format!("{} {} {:.2} < {:.2}", mode, name, value, min));
        }
    }
    failed
}

/// Base confidence plus a small bonus for how far delta clears the minimum
fn tier_confidence(tier: &TierThresholds, delta_pct: f64) -> f64 {
    let excess = if tier.min_delta_pct > 0.0 {
        (delta_pct / tier.min_delta_pct - 1.0).max(0.0)
    } else {
        0.0
    };
    (tier.base_confidence + (excess * 0.05).min(0.15)).min(MAX_CONFIDENCE)
}
