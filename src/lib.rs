pub mod adapters;
pub mod cli;
pub mod collector;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod safety;
pub mod strategy;

pub use collector::{FeedConfig, MarketDataEnricher};
pub use config::AppConfig;
pub use coordination::{
    BreakerConfig, BreakerStatus, CircuitState, GracefulShutdown, LossCircuitBreaker,
    ShutdownSignal,
};
pub use domain::{
    EnrichedSignal, FilterDecision, MarketSignal, ModeDecision, OutboundDecision, TargetOutcome,
    TargetPlan, TradingMode,
};
pub use error::{PumpGateError, Result};
pub use safety::{RetrainAck, RetrainGate, RetrainGateConfig, RetrainPermission};
pub use strategy::{
    AdaptiveTargetEngine, DecisionPipeline, PumpTargetEngine, SignalConfirmationFilter,
    SignalRouter,
};
