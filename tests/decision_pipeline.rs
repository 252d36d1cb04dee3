use chrono::Utc;
use pumpgate::collector::MarketDataEnricher;
use pumpgate::coordination::{BreakerConfig, CircuitState, LossCircuitBreaker};
use pumpgate::domain::{Direction, FilterAction, FilterReason, MarketSignal, OutboundAction, TradingMode};
use pumpgate::strategy::{
    AdaptiveTargetEngine, DecisionPipeline, MarketContext, MarketRegime, SignalConfirmationFilter,
    SignalRouter, TargetConfig,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn signal(strategy: &str, direction: Direction, delta: f64) -> MarketSignal {
    MarketSignal {
        symbol: "QRSUSDT".into(),
        strategy: strategy.into(),
        direction,
        price: dec!(3.20),
        delta_pct: delta,
        buys_per_sec: 12.0,
        vol_raise_pct: 70.0,
        volume_24h: 56_000_000.0,
        timestamp: Utc::now(),
        raw_signal: format!("{} QRSUSDT", strategy),
    }
}

fn pipeline_with(targets: TargetConfig, breaker: BreakerConfig) -> DecisionPipeline {
    DecisionPipeline::new(
        Arc::new(MarketDataEnricher::with_defaults()),
        Arc::new(SignalConfirmationFilter::with_defaults()),
        Arc::new(SignalRouter::with_defaults()),
        Arc::new(AdaptiveTargetEngine::new(targets)),
        Arc::new(LossCircuitBreaker::new(breaker)),
    )
}

/// A drop signal alone is skipped; backed by a pump signal it is confirmed.
#[tokio::test]
async fn drop_needs_pump_corroboration() {
    let filter = SignalConfirmationFilter::with_defaults();
    let drop = signal("Drops", Direction::Short, 6.67);

    let alone = filter.filter(&drop).await;
    assert_eq!(alone.action, FilterAction::Skip);
    assert_eq!(alone.confidence, 0.2);

    let filter = SignalConfirmationFilter::with_defaults();
    filter.filter(&signal("Pump", Direction::Long, 8.0)).await;
    let backed = filter.filter(&drop).await;
    assert_eq!(backed.action, FilterAction::Confirm);
    assert_eq!(backed.reason, FilterReason::MomentumConfirmed);
    assert_eq!(backed.confidence, 0.6);
    assert_eq!(backed.corroborating.len(), 1);
}

/// A confirmed drop trades with its confidence scaled by the corroboration.
#[tokio::test]
async fn confirmed_signal_executes_with_reduced_confidence() {
    let p = pipeline_with(TargetConfig::default(), BreakerConfig::default());
    let ctx = MarketContext::default();

    let pump = p.evaluate(&signal("Pump", Direction::Long, 6.67), &ctx).await;
    assert_eq!(pump.action, OutboundAction::Execute);
    assert_eq!(pump.mode, TradingMode::Scalp);

    let drop = p.evaluate(&signal("Drops", Direction::Short, 6.67), &ctx).await;
    assert_eq!(drop.action, OutboundAction::Execute);
    assert!((drop.confidence - pump.confidence * 0.6).abs() < 1e-9);
    assert!(drop.position_size_usd < pump.position_size_usd);
}

/// Every released plan satisfies the minimum reward/risk.
#[tokio::test]
async fn released_plans_respect_min_rr() {
    let p = pipeline_with(TargetConfig::default(), BreakerConfig::default());
    for (regime, rsi, atr) in [
        (MarketRegime::Bearish, Some(85.0), Some(0.5)),
        (MarketRegime::Bullish, Some(55.0), Some(9.0)),
        (MarketRegime::Sideways, None, None),
    ] {
        let ctx = MarketContext {
            atr_pct: atr,
            rsi,
            regime,
        };
        let d = p.evaluate(&signal("TopMarket", Direction::Long, 17.31), &ctx).await;
        assert_eq!(d.action, OutboundAction::Execute);
        assert!(d.tp_pct / d.sl_pct >= 1.5 - 1e-9, "{:?}", d);
    }
}

/// Released plans consume the daily exposure until nothing fits.
#[tokio::test]
async fn exposure_budget_turns_into_skip() {
    let p = pipeline_with(
        TargetConfig {
            max_daily_exposure_usd: 150.0,
            ..Default::default()
        },
        BreakerConfig::default(),
    );
    let ctx = MarketContext::default();
    let s = signal("TopMarket", Direction::Long, 17.31);

    let first = p.evaluate(&s, &ctx).await;
    assert_eq!(first.action, OutboundAction::Execute);
    let second = p.evaluate(&s, &ctx).await;
    assert_eq!(second.action, OutboundAction::Execute);
    assert!(second.position_size_usd <= 150.0 - first.position_size_usd + 1e-9);

    let third = p.evaluate(&s, &ctx).await;
    assert_eq!(third.action, OutboundAction::Skip);
    assert!(third.reasons.iter().any(|r| r.contains("exposure")));
}

/// Concurrent evaluations share the daily budget without overspending it.
#[tokio::test]
async fn concurrent_evaluations_stay_within_exposure() {
    let p = pipeline_with(
        TargetConfig {
            max_daily_exposure_usd: 150.0,
            ..Default::default()
        },
        BreakerConfig::default(),
    );
    let s = signal("TopMarket", Direction::Long, 17.31);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let p = p.clone();
        let s = s.clone();
        handles.push(tokio::spawn(async move {
            p.evaluate(&s, &MarketContext::default()).await
        }));
    }
    let mut executed = Vec::new();
    for h in handles {
        let d = h.await.unwrap();
        if d.action == OutboundAction::Execute {
            executed.push(d.position_size_usd);
        }
    }

    let spent: f64 = executed.iter().sum();
    assert!(spent <= 150.0 + 1e-9, "spent {} of a 150 budget", spent);
    assert_eq!(executed.len(), 2, "100 then the 50 remainder");
    assert_eq!(p.targets().remaining_exposure().await, 0.0);
}

/// Reported losses open the breaker and block the next plan.
#[tokio::test]
async fn losses_block_release() {
    let p = pipeline_with(TargetConfig::default(), BreakerConfig::default());
    for _ in 0..3 {
        p.record_outcome(false, 0.4, "QRSUSDT", "stop").await;
    }
    let d = p
        .evaluate(&signal("TopMarket", Direction::Long, 17.31), &MarketContext::default())
        .await;
    assert_eq!(d.action, OutboundAction::Blocked);
    assert_eq!(d.breaker_state, CircuitState::Open);
    assert_eq!(d.position_size_usd, 0.0);
    assert_eq!(
        p.targets().remaining_exposure().await,
        1_000.0,
        "a blocked plan must hand its size back"
    );

    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["action"], "BLOCKED");
    assert_eq!(json["breaker_state"], "OPEN");
    assert_eq!(json["mode"], "SUPER_SCALP");
}
