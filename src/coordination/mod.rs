//! Coordination layer
//!
//! - Loss circuit breaker gating trade release
//! - Graceful shutdown for long-lived tasks

pub mod circuit_breaker;
pub mod shutdown;

pub use circuit_breaker::{
    BreakerConfig, BreakerState, BreakerStatus, CircuitState, LossCircuitBreaker, LossRecord,
    TripReason, LOSS_HISTORY_CAPACITY,
};
pub use shutdown::{GracefulShutdown, ShutdownListener, ShutdownSignal};
