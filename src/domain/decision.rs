use serde::{Deserialize, Serialize};

use crate::coordination::CircuitState;

/// What the confirmation filter wants done with a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterAction {
    Skip,
    Confirm,
    Allow,
}

impl FilterAction {
    /// Whether the signal may continue to the router
    pub fn passes(&self) -> bool {
        !matches!(self, FilterAction::Skip)
    }
}

impl std::fmt::Display for FilterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterAction::Skip => write!(f, "SKIP"),
            FilterAction::Confirm => write!(f, "CONFIRM"),
            FilterAction::Allow => write!(f, "ALLOW"),
        }
    }
}

/// Reason code attached to a filter decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    NotLowTrust,
    NoConfirmation,
    MomentumConfirmed,
    ReversalPattern,
    StrongDelta,
    WeakConfirmation,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::NotLowTrust => "not_low_trust",
            FilterReason::NoConfirmation => "no_confirmation",
            FilterReason::MomentumConfirmed => "momentum_confirmed",
            FilterReason::ReversalPattern => "reversal_pattern",
            FilterReason::StrongDelta => "strong_delta",
            FilterReason::WeakConfirmation => "weak_confirmation",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub action: FilterAction,
    pub reason: FilterReason,
    pub confidence: f64,
    /// Descriptors of the buffered signals that were considered corroboration
    pub corroborating: Vec<String>,
}

impl FilterDecision {
    pub fn new(action: FilterAction, reason: FilterReason, confidence: f64) -> Self {
        Self {
            action,
            reason,
            confidence,
            corroborating: Vec::new(),
        }
    }

    pub fn with_corroborating(mut self, corroborating: Vec<String>) -> Self {
        self.corroborating = corroborating;
        self
    }
}

/// Trading-mode tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    SuperScalp,
    Scalp,
    Swing,
    Skip,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::SuperScalp => "SUPER_SCALP",
            TradingMode::Scalp => "SCALP",
            TradingMode::Swing => "SWING",
            TradingMode::Skip => "SKIP",
        }
    }

    pub fn is_tradeable(&self) -> bool {
        !matches!(self, TradingMode::Skip)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk envelope of a trading mode.
///
/// Selected once by the router; execution and risk code take it as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub target_pct: f64,
    pub stop_pct: f64,
    pub timeout_sec: u64,
    pub max_capital_pct: f64,
    pub daily_loss_limit_pct: f64,
    pub circuit_losses: u32,
    pub cooldown_sec: u64,
    pub latency_max_ms: u64,
}

impl ModeConfig {
    pub fn super_scalp() -> Self {
        Self {
            target_pct: 1.5,
            stop_pct: 0.8,
            timeout_sec: 120,
            max_capital_pct: 5.0,
            daily_loss_limit_pct: 2.0,
            circuit_losses: 3,
            cooldown_sec: 300,
            latency_max_ms: 200,
        }
    }

    pub fn scalp() -> Self {
        Self {
            target_pct: 3.0,
            stop_pct: 1.5,
            timeout_sec: 600,
            max_capital_pct: 10.0,
            daily_loss_limit_pct: 3.0,
            circuit_losses: 3,
            cooldown_sec: 600,
            latency_max_ms: 500,
        }
    }

    pub fn swing() -> Self {
        Self {
            target_pct: 8.0,
            stop_pct: 4.0,
            timeout_sec: 14_400,
            max_capital_pct: 15.0,
            daily_loss_limit_pct: 5.0,
            circuit_losses: 2,
            cooldown_sec: 1_800,
            latency_max_ms: 2_000,
        }
    }

    /// Envelope of the SKIP mode: nothing may be risked
    pub fn skip() -> Self {
        Self {
            target_pct: 0.0,
            stop_pct: 0.0,
            timeout_sec: 0,
            max_capital_pct: 0.0,
            daily_loss_limit_pct: 0.0,
            circuit_losses: 0,
            cooldown_sec: 0,
            latency_max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeDecision {
    pub mode: TradingMode,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub config: ModeConfig,
}

/// Take-profit / stop-loss / size for a routed signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPlan {
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub rr_ratio: f64,
    pub position_size_usd: f64,
    pub confidence: f64,
    /// Human-readable factor breakdown
    pub factors: String,
}

/// Result of a target calculation. `NoTrade` is a terminal answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome<P> {
    Trade(P),
    NoTrade { reason: String },
}

impl<P> TargetOutcome<P> {
    pub fn no_trade(reason: impl Into<String>) -> Self {
        TargetOutcome::NoTrade {
            reason: reason.into(),
        }
    }

    pub fn plan(&self) -> Option<&P> {
        match self {
            TargetOutcome::Trade(plan) => Some(plan),
            TargetOutcome::NoTrade { .. } => None,
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, TargetOutcome::Trade(_))
    }
}

/// What the Execution Gateway is told to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboundAction {
    Execute,
    Skip,
    Blocked,
}

impl std::fmt::Display for OutboundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboundAction::Execute => write!(f, "EXECUTE"),
            OutboundAction::Skip => write!(f, "SKIP"),
            OutboundAction::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Decision handed to the Execution Gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundDecision {
    pub symbol: String,
    pub mode: TradingMode,
    pub action: OutboundAction,
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub position_size_usd: f64,
    pub confidence: f64,
    pub breaker_state: CircuitState,
    pub reasons: Vec<String>,
}

impl OutboundDecision {
    /// A non-trading decision with zeroed trade parameters
    pub fn stand_down(
        symbol: impl Into<String>,
        mode: TradingMode,
        action: OutboundAction,
        breaker_state: CircuitState,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            mode,
            action,
            tp_pct: 0.0,
            sl_pct: 0.0,
            position_size_usd: 0.0,
            confidence: 0.0,
            breaker_state,
            reasons,
        }
    }
}
