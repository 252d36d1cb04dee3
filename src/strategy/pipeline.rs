//! Decision pipeline
//!
//! enrich -> confirm -> route -> targets -> breaker. Every non-trading branch
//! ends in a `Skip` or `Blocked` decision carrying its reasons; nothing in the
//! hot path returns an error.

use std::sync::Arc;
use tracing::{debug, info};

use super::confirmation::SignalConfirmationFilter;
use super::router::SignalRouter;
use super::targets::{AdaptiveTargetEngine, MarketContext};
use crate::collector::MarketDataEnricher;
use crate::coordination::LossCircuitBreaker;
use crate::domain::{MarketSignal, OutboundAction, OutboundDecision, TargetOutcome, TradingMode};

/// Owns every hot-path component for the life of the process
#[derive(Clone)]
pub struct DecisionPipeline {
    enricher: Arc<MarketDataEnricher>,
    filter: Arc<SignalConfirmationFilter>,
    router: Arc<SignalRouter>,
    targets: Arc<AdaptiveTargetEngine>,
    breaker: Arc<LossCircuitBreaker>,
}

impl DecisionPipeline {
    pub fn new(
        enricher: Arc<MarketDataEnricher>,
        filter: Arc<SignalConfirmationFilter>,
        router: Arc<SignalRouter>,
        targets: Arc<AdaptiveTargetEngine>,
        breaker: Arc<LossCircuitBreaker>,
    ) -> Self {
        Self {
            enricher,
            filter,
            router,
            targets,
            breaker,
        }
    }

    pub fn enricher(&self) -> &Arc<MarketDataEnricher> {
        &self.enricher
    }

    pub fn breaker(&self) -> &Arc<LossCircuitBreaker> {
        &self.breaker
    }

    pub fn targets(&self) -> &Arc<AdaptiveTargetEngine> {
        &self.targets
    }

    /// Evaluate one signal
    pub async fn evaluate(&self, signal: &MarketSignal, ctx: &MarketContext) -> OutboundDecision {
        let enriched = self.enricher.enrich(signal).await;
        let mut reasons = Vec::new();
        if enriched.market.is_stale {
            reasons.push("market data stale, neutral defaults".to_string());
        }

        let filtered = self.filter.filter(signal).await;
        reasons.push(format!(
            "filter {} ({}, {:.2})",
            filtered.action, filtered.reason, filtered.confidence
        ));
        if !filtered.action.passes() {
            return self.stand_down(signal, None, OutboundAction::Skip, reasons).await;
        }

        let mut mode = self.router.route_enriched(&enriched);
        reasons.extend(mode.reasons.iter().cloned());
        if !mode.mode.is_tradeable() {
            return self
                .stand_down(signal, Some(mode.mode), OutboundAction::Skip, reasons)
                .await;
        }

        if enriched.latency_ms > mode.config.latency_max_ms {
            reasons.push(format!(
                "enrichment took {}ms > {}ms {} budget",
                enriched.latency_ms, mode.config.latency_max_ms, mode.mode
            ));
            return self
                .stand_down(signal, Some(mode.mode), OutboundAction::Skip, reasons)
                .await;
        }

        // A corroborated low-trust signal is only as good as its corroboration
        mode.confidence *= filtered.confidence;

        let plan = match self.targets.calculate(&mode, ctx).await {
            TargetOutcome::Trade(plan) => plan,
            TargetOutcome::NoTrade { reason } => {
                reasons.push(format!("no trade: {}", reason));
                return self
                    .stand_down(signal, Some(mode.mode), OutboundAction::Skip, reasons)
                    .await;
            }
        };
        reasons.push(plan.factors.clone());

        if !self.breaker.can_trade().await {
            self.targets.release_exposure(plan.position_size_usd).await;
            let status = self.breaker.get_status().await;
            reasons.push(match status.last_trip_reason {
                Some(trip) => format!("circuit {}: {}", status.state, trip),
                None => format!("circuit {}", status.state),
            });
            return OutboundDecision::stand_down(
                signal.symbol.clone(),
                mode.mode,
                OutboundAction::Blocked,
                status.state,
                reasons,
            );
        }

        let breaker_state = self.breaker.state().await;
        info!(
            "EXECUTE {} {} tp {:.2}% sl {:.2}% ${:.2}",
            signal.symbol, mode.mode, plan.tp_pct, plan.sl_pct, plan.position_size_usd
        );

        OutboundDecision {
            symbol: signal.symbol.clone(),
            mode: mode.mode,
            action: OutboundAction::Execute,
            tp_pct: plan.tp_pct,
            sl_pct: plan.sl_pct,
            position_size_usd: plan.position_size_usd,
            confidence: plan.confidence,
            breaker_state,
            reasons,
        }
    }

    async fn stand_down(
        &self,
        signal: &MarketSignal,
        mode: Option<TradingMode>,
        action: OutboundAction,
        reasons: Vec<String>,
    ) -> OutboundDecision {
        let mode = mode.unwrap_or(TradingMode::Skip);
        debug!("{} {} {}: {:?}", signal.symbol, mode, action, reasons);
        let breaker_state = self.breaker.state().await;
        OutboundDecision::stand_down(signal.symbol.clone(), mode, action, breaker_state, reasons)
    }

    /// Feed a realised outcome to the breaker and the sizing streak
    pub async fn record_outcome(&self, win: bool, loss_pct: f64, symbol: &str, reason: &str) {
        self.breaker
            .record_outcome(win, loss_pct, symbol, reason)
            .await;
        self.targets.record_trade_result(win);
    }
}
