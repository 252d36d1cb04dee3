//! Corroboration filter for low-trust signal families
//!
//! Drop-style detectors fire on noise far more often than pump detectors,
//! so their signals only pass when another recent signal for the same
//! symbol backs them up.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{
    normalize_tag, Direction, FilterAction, FilterDecision, FilterReason, MarketSignal,
};

/// Confirmation filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Signals kept for corroboration
    pub buffer_capacity: usize,
    /// Max distance in seconds between a signal and its corroboration
    pub lookback_secs: i64,
    /// Delta at or above which any corroborating signal counts as strong
    pub strong_delta_pct: f64,
    pub low_trust_families: Vec<String>,
    pub momentum_families: Vec<String>,
    pub reversal_families: Vec<String>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            lookback_secs: 300,
            strong_delta_pct: 5.0,
            low_trust_families: vec!["drops".into(), "dropsdetection".into(), "dump".into()],
            momentum_families: vec![
                "pump".into(),
                "pumpdetection".into(),
                "topmarket".into(),
                "buyspersec".into(),
                "volumedetection".into(),
            ],
            reversal_families: vec!["reversal".into(), "dropslong".into(), "bounce".into()],
        }
    }
}

/// Signal family as seen by the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFamily {
    /// Long signal from a reversal detector
    ReversalLong,
    LowTrust,
    Momentum,
    Other,
}

/// Rolling-buffer corroboration filter
pub struct SignalConfirmationFilter {
    config: ConfirmationConfig,
    buffer: Mutex<VecDeque<MarketSignal>>,
}

impl SignalConfirmationFilter {
    pub fn new(config: ConfirmationConfig) -> Self {
        let capacity = config.buffer_capacity.max(1);
        Self {
            config: ConfirmationConfig {
                buffer_capacity: capacity,
                ..config
            },
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConfirmationConfig::default())
    }

    /// Classify by exact or partial match on the strategy tag and the raw
    /// provenance text. Reversal is checked first so "drops long" is not
    /// mistaken for a plain drop.
    pub fn classify(&self, signal: &MarketSignal) -> SignalFamily {
        let strategy = signal.strategy_key();
        let provenance = signal.provenance_key();
        let matches = |families: &[String]| {
            families.iter().map(|f| normalize_tag(f)).any(|f| {
                !f.is_empty() && (strategy == f || strategy.contains(&f) || provenance.contains(&f))
            })
        };

        if signal.direction == Direction::Long && matches(&self.config.reversal_families) {
            SignalFamily::ReversalLong
        } else if matches(&self.config.low_trust_families) {
            SignalFamily::LowTrust
        } else if matches(&self.config.momentum_families) {
            SignalFamily::Momentum
        } else {
            SignalFamily::Other
        }
    }

    /// Decide whether a signal may continue downstream. Signals outside the
    /// low-trust family are buffered afterwards as potential corroboration;
    /// low-trust signals never corroborate each other.
    pub async fn filter(&self, signal: &MarketSignal) -> FilterDecision {
        let mut buffer = self.buffer.lock().await;

        let low_trust = self.classify(signal) == SignalFamily::LowTrust;
        let decision = if low_trust {
            self.evaluate_low_trust(signal, &buffer)
        } else {
            FilterDecision::new(FilterAction::Allow, FilterReason::NotLowTrust, 1.0)
        };

        if !low_trust {
            if buffer.len() >= self.config.buffer_capacity {
                buffer.pop_front();
            }
            buffer.push_back(signal.clone());
        }

        debug!(
            "Filter {} {}: {} ({}, confidence {:.2})",
            signal.symbol, signal.strategy, decision.action, decision.reason, decision.confidence
        );
        decision
    }

    fn evaluate_low_trust(
        &self,
        signal: &MarketSignal,
        buffer: &VecDeque<MarketSignal>,
    ) -> FilterDecision {
        let window = Duration::seconds(self.config.lookback_secs);
        let corroborating: Vec<&MarketSignal> = buffer
            .iter()
            .filter(|other| other.symbol == signal.symbol)
            .filter(|other| *other != signal)
            .filter(|other| (signal.timestamp - other.timestamp).abs() <= window)
            .collect();

        if corroborating.is_empty() {
            info!("Low-trust {} signal for {} has no confirmation", signal.strategy, signal.symbol);
            return FilterDecision::new(FilterAction::Skip, FilterReason::NoConfirmation, 0.2);
        }

        let descriptors: Vec<String> = corroborating.iter().map(|s| describe(s)).collect();
        let families: Vec<SignalFamily> = corroborating.iter().map(|s| self.classify(s)).collect();

        let decision = if families.contains(&SignalFamily::Momentum) {
            FilterDecision::new(FilterAction::Confirm, FilterReason::MomentumConfirmed, 0.6)
        } else if families.contains(&SignalFamily::ReversalLong) {
            FilterDecision::new(FilterAction::Allow, FilterReason::ReversalPattern, 0.7)
        } else if corroborating
            .iter()
            .any(|s| s.delta_pct.abs() >= self.config.strong_delta_pct)
        {
            FilterDecision::new(FilterAction::Confirm, FilterReason::StrongDelta, 0.5)
        } else {
            FilterDecision::new(FilterAction::Skip, FilterReason::WeakConfirmation, 0.3)
        };

        decision.with_corroborating(descriptors)
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

fn describe(signal: &MarketSignal) -> String {
    format!(
        "{}@{} delta={:.2}%",
        signal.strategy,
        signal.timestamp.format("%H:%M:%S"),
        signal.delta_pct
    )
}
