//! Tiered pump-strength targets
//!
//! Classifies a pump by its delta into an ordered tier and scales the tier's
//! base target with diminishing returns on delta, the coin's volatility and a
//! drawdown-derived safety margin.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{MarketSignal, TargetOutcome};

/// Cap on the square-root pump factor
const MAX_PUMP_FACTOR: f64 = 3.0;
/// Cap on the drawdown safety margin
const MAX_SAFETY_MARGIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PumpTier {
    Noise,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
    Extreme,
}

impl std::fmt::Display for PumpTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PumpTier::Noise => "NOISE",
            PumpTier::Weak => "WEAK",
            PumpTier::Moderate => "MODERATE",
            PumpTier::Strong => "STRONG",
            PumpTier::VeryStrong => "VERY_STRONG",
            PumpTier::Extreme => "EXTREME",
        };
        write!(f, "{}", s)
    }
}

/// Envelope of one pump tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpTierSpec {
    pub tier: PumpTier,
    /// Lowest delta (%) in this tier
    pub min_delta_pct: f64,
    pub base_target_pct: f64,
    pub base_stop_pct: f64,
    pub timeout_sec: u64,
    pub max_target_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpTierConfig {
    /// Tiers above NOISE, any order; deltas below the lowest are NOISE
    pub tiers: Vec<PumpTierSpec>,
    pub strong_buys_per_sec: f64,
    pub moderate_buys_per_sec: f64,
    pub strong_vol_raise_pct: f64,
    pub moderate_vol_raise_pct: f64,
}

impl Default for PumpTierConfig {
    fn default() -> Self {
        let spec = |tier, min, target, stop, timeout, max| PumpTierSpec {
            tier,
            min_delta_pct: min,
            base_target_pct: target,
            base_stop_pct: stop,
            timeout_sec: timeout,
            max_target_pct: max,
        };
        Self {
            tiers: vec![
                spec(PumpTier::Weak, 3.0, 1.5, 1.0, 300, 4.0),
                spec(PumpTier::Moderate, 5.0, 3.0, 1.5, 600, 8.0),
                spec(PumpTier::Strong, 10.0, 6.0, 3.0, 900, 15.0),
                spec(PumpTier::VeryStrong, 20.0, 12.0, 5.0, 1_800, 30.0),
                spec(PumpTier::Extreme, 40.0, 20.0, 8.0, 3_600, 50.0),
            ],
            strong_buys_per_sec: 50.0,
            moderate_buys_per_sec: 20.0,
            strong_vol_raise_pct: 200.0,
            moderate_vol_raise_pct: 100.0,
        }
    }
}

/// Per-coin behaviour used to scale targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinProfile {
    pub volatility_multiplier: f64,
    /// Typical historical drawdown after a pump, percent
    pub max_drawdown_pct: f64,
}

impl Default for CoinProfile {
    fn default() -> Self {
        Self {
            volatility_multiplier: 1.0,
            max_drawdown_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpTarget {
    pub tier: PumpTier,
    pub target_pct: f64,
    pub stop_pct: f64,
    pub timeout_sec: u64,
    pub factors: String,
}

pub struct PumpTargetEngine {
    config: PumpTierConfig,
}

impl PumpTargetEngine {
    pub fn new(mut config: PumpTierConfig) -> Self {
        // Strongest first so classification is first-match
        config
            .tiers
            .sort_by(|a, b| b.min_delta_pct.total_cmp(&a.min_delta_pct));
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PumpTierConfig::default())
    }

    fn tier_spec(&self, delta_pct: f64) -> Option<&PumpTierSpec> {
        self.config
            .tiers
            .iter()
            .find(|t| t.tier != PumpTier::Noise && delta_pct >= t.min_delta_pct)
    }

    pub fn classify(&self, delta_pct: f64) -> PumpTier {
        self.tier_spec(delta_pct)
            .map(|t| t.tier)
            .unwrap_or(PumpTier::Noise)
    }

    pub fn calculate(&self, signal: &MarketSignal, coin: &CoinProfile) -> TargetOutcome<PumpTarget> {
        let delta = signal.delta_pct;
        let spec = match self.tier_spec(delta) {
            Some(spec) if spec.min_delta_pct > 0.0 => spec,
            _ => return TargetOutcome::no_trade(format!("delta {:.2}% is NOISE", delta)),
        };

        let pump_factor = (delta / spec.min_delta_pct).sqrt().min(MAX_PUMP_FACTOR);
        let vol_mult = coin.volatility_multiplier.max(0.0);
        let margin = safety_margin(coin.max_drawdown_pct, delta);
        let buy_bonus = self.buy_bonus(signal.buys_per_sec);
        let volume_bonus = self.volume_bonus(signal.vol_raise_pct);

        let raw = spec.base_target_pct
            * pump_factor
            * vol_mult
            * (1.0 - margin)
            * (1.0 + buy_bonus)
            * (1.0 + volume_bonus);
        let target = raw.min(spec.max_target_pct);
        if target.is_nan() || target <= 0.0 {
            return TargetOutcome::no_trade(format!("{} target computed as {:.2}%", spec.tier, target));
        }
        let stop = spec.base_stop_pct * vol_mult;

        debug!(
            "{} {} pump {:.2}%: target {:.2}% stop {:.2}%",
            signal.symbol, spec.tier, delta, target, stop
        );
        TargetOutcome::Trade(PumpTarget {
            tier: spec.tier,
            target_pct: target,
            stop_pct: stop,
            timeout_sec: spec.timeout_sec,
            factors: format!(
                "base {:.2} pump x{:.2} vol x{:.2} margin -{:.0}% buys +{:.0}% volume +{:.0}% max {:.2}",
                spec.base_target_pct,
                pump_factor,
                vol_mult,
                margin * 100.0,
                buy_bonus * 100.0,
                volume_bonus * 100.0,
                spec.max_target_pct
            ),
        })
    }

    fn buy_bonus(&self, buys_per_sec: f64) -> f64 {
        if buys_per_sec >= self.config.strong_buys_per_sec {
            0.10
        } else if buys_per_sec >= self.config.moderate_buys_per_sec {
            0.05
        } else {
            0.0
        }
    }

    fn volume_bonus(&self, vol_raise_pct: f64) -> f64 {
        if vol_raise_pct >= self.config.strong_vol_raise_pct {
            0.10
        } else if vol_raise_pct >= self.config.moderate_vol_raise_pct {
            0.05
        } else {
            0.0
        }
    }
}

/// Share of the target given up for historical drawdown, damped for bigger pumps
pub fn safety_margin(max_drawdown_pct: f64, delta_pct: f64) -> f64 {
    if max_drawdown_pct <= 0.0 {
        return 0.0;
    }
    let damping = 1.0 + (1.0 + delta_pct.max(0.0) / 10.0).ln();
    (max_drawdown_pct / 100.0 * 0.5 / damping).min(MAX_SAFETY_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn pump(delta: f64, buys: f64, vol_raise: f64) -> MarketSignal {
        MarketSignal {
            symbol: "PEPEUSDT".into(),
            strategy: "PumpDetection".into(),
            direction: Direction::Long,
            price: dec!(0.0000123),
            delta_pct: delta,
            buys_per_sec: buys,
            vol_raise_pct: vol_raise,
            volume_24h: 80_000_000.0,
            timestamp: Utc::now(),
            raw_signal: String::new(),
        }
    }

    #[test]
    fn test_classify_boundaries() {
        let e = PumpTargetEngine::with_defaults();
        assert_eq!(e.classify(2.99), PumpTier::Noise);
        assert_eq!(e.classify(3.0), PumpTier::Weak);
        assert_eq!(e.classify(5.0), PumpTier::Moderate);
        assert_eq!(e.classify(19.9), PumpTier::Strong);
        assert_eq!(e.classify(20.0), PumpTier::VeryStrong);
        assert_eq!(e.classify(400.0), PumpTier::Extreme);
    }

    #[test]
    fn test_noise_is_no_trade() {
        let e = PumpTargetEngine::with_defaults();
        let out = e.calculate(&pump(1.2, 100.0, 500.0), &CoinProfile::default());
        assert!(matches!(out, TargetOutcome::NoTrade { .. }));
    }

    #[test]
    fn test_base_target_at_tier_floor() {
        let e = PumpTargetEngine::with_defaults();
        let out = e.calculate(&pump(10.0, 0.0, 0.0), &CoinProfile::default());
        let t = out.plan().unwrap();
        assert_eq!(t.tier, PumpTier::Strong);
        assert!((t.target_pct - 6.0).abs() < 1e-9);
        assert!((t.stop_pct - 3.0).abs() < 1e-9);
        assert_eq!(t.timeout_sec, 900);
    }

    #[test]
    fn test_pump_factor_diminishing() {
        let e = PumpTargetEngine::with_defaults();
        // 1.2x the STRONG floor -> factor sqrt(1.2)
        let out = e.calculate(&pump(12.0, 0.0, 0.0), &CoinProfile::default());
        let t = out.plan().unwrap();
        assert_eq!(t.tier, PumpTier::Strong);
        assert!(t.factors.contains("pump x1.10"));
        assert!((t.target_pct - 6.0 * 1.2_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_bonuses_and_clamp() {
        let e = PumpTargetEngine::with_defaults();
        let plain = e.calculate(&pump(5.0, 0.0, 0.0), &CoinProfile::default());
        let boosted = e.calculate(&pump(5.0, 60.0, 250.0), &CoinProfile::default());
        let p = plain.plan().unwrap().target_pct;
        let b = boosted.plan().unwrap().target_pct;
        assert!((b - p * 1.1 * 1.1).abs() < 1e-9);

        let wild = CoinProfile {
            volatility_multiplier: 5.0,
            max_drawdown_pct: 0.0,
        };
        let clamped = e.calculate(&pump(9.0, 60.0, 250.0), &wild);
        assert_eq!(clamped.plan().unwrap().target_pct, 8.0);
    }

    #[test]
    fn test_safety_margin_damped_and_capped() {
        assert_eq!(safety_margin(0.0, 10.0), 0.0);
        let small = safety_margin(20.0, 3.0);
        let big = safety_margin(20.0, 60.0);
        assert!(big < small);
        assert_eq!(safety_margin(1_000.0, 0.0), MAX_SAFETY_MARGIN);
    }

    #[test]
    fn test_zero_volatility_is_no_trade() {
        let e = PumpTargetEngine::with_defaults();
        let flat = CoinProfile {
            volatility_multiplier: 0.0,
            max_drawdown_pct: 0.0,
        };
        let out = e.calculate(&pump(25.0, 0.0, 0.0), &flat);
        assert!(!out.is_trade());
    }
}
