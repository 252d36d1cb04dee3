//! Decision strategy
//!
//! - `confirmation` - corroboration filter for low-trust signal families
//! - `router` - trading-mode tiering
//! - `targets` - adaptive TP/SL/size
//! - `pump_tiers` - tiered pump-strength targets
//! - `pipeline` - the composed hot path

pub mod confirmation;
pub mod pipeline;
pub mod pump_tiers;
pub mod router;
pub mod targets;

pub use confirmation::{ConfirmationConfig, SignalConfirmationFilter, SignalFamily};
pub use pipeline::DecisionPipeline;
pub use pump_tiers::{
    safety_margin, CoinProfile, PumpTarget, PumpTargetEngine, PumpTier, PumpTierConfig,
    PumpTierSpec,
};
pub use router::{ModesConfig, RouterConfig, SignalRouter, TierThresholds};
pub use targets::{AdaptiveTargetEngine, MarketContext, MarketRegime, TargetConfig};
