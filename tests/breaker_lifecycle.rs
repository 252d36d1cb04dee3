use chrono::{Duration, Utc};
use pumpgate::coordination::{BreakerConfig, CircuitState, LossCircuitBreaker, TripReason};
use std::sync::Arc;

/// CLOSED -> OPEN -> HALF_OPEN -> CLOSED, with a half-open loss on the way.
#[tokio::test]
async fn full_lifecycle_with_recovery_reset() {
    let cb = LossCircuitBreaker::new(BreakerConfig {
        half_open_max_trades: 5,
        ..Default::default()
    });
    let t0 = Utc::now();

    for _ in 0..3 {
        assert!(cb.can_trade_at(t0).await);
        cb.record_outcome_at(false, 0.8, "AUSDT", "stop loss", t0).await;
    }
    assert_eq!(cb.state().await, CircuitState::Open);

    // Cooldown is checked lazily by can_trade
    let before = t0 + Duration::seconds(1_799);
    assert!(!cb.can_trade_at(before).await);
    assert_eq!(cb.state().await, CircuitState::Open);

    let after = t0 + Duration::seconds(1_800);
    assert!(cb.can_trade_at(after).await);
    assert_eq!(cb.state().await, CircuitState::HalfOpen);

    // A loss resets recovery progress but does not re-open
    cb.record_outcome_at(true, 0.0, "AUSDT", "tp", after).await;
    cb.record_outcome_at(false, 0.3, "AUSDT", "stop loss", after).await;
    let status = cb.get_status_at(after).await;
    assert_eq!(status.state, CircuitState::HalfOpen);
    assert_eq!(status.recovery_wins, 0);

    // Two uninterrupted wins close it
    cb.record_outcome_at(true, 0.0, "AUSDT", "tp", after).await;
    assert_eq!(cb.state().await, CircuitState::HalfOpen);
    cb.record_outcome_at(true, 0.0, "AUSDT", "tp", after).await;

    let status = cb.get_status_at(after).await;
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.consecutive_losses, 0);
    assert_eq!(status.total_trips, 1);
}

/// Half-open probes that never recover send the breaker back to OPEN.
#[tokio::test]
async fn half_open_budget_exhaustion_reopens() {
    let cb = LossCircuitBreaker::with_defaults();
    let t0 = Utc::now();
    for _ in 0..3 {
        cb.record_outcome_at(false, 0.5, "BUSDT", "stop", t0).await;
    }
    let probe = t0 + Duration::seconds(1_800);
    assert!(cb.can_trade_at(probe).await);

    cb.record_outcome_at(true, 0.0, "BUSDT", "tp", probe).await;
    cb.record_outcome_at(false, 0.5, "BUSDT", "stop", probe).await;
    cb.record_outcome_at(true, 0.0, "BUSDT", "tp", probe).await;

    let status = cb.get_status_at(probe).await;
    assert_eq!(status.state, CircuitState::Open);
    assert_eq!(
        status.last_trip_reason,
        Some(TripReason::HalfOpenExhausted { trades: 3, wins: 1 })
    );
    assert_eq!(status.total_trips, 2);
    assert_eq!(status.cooldown_remaining_secs, Some(1_800));
}

/// Loss thresholds are checked in priority order: streak, count, percent.
#[tokio::test]
async fn trip_reason_priority() {
    // All three limits breached by one loss: the streak wins
    let cb = LossCircuitBreaker::new(BreakerConfig {
        max_consecutive_losses: 1,
        max_daily_losses: 1,
        max_daily_loss_pct: 1.0,
        ..Default::default()
    });
    cb.record_outcome(false, 5.0, "AUSDT", "gap").await;
    assert_eq!(
        cb.get_status().await.last_trip_reason,
        Some(TripReason::ConsecutiveLosses { count: 1 })
    );

    // Count and percent breached together: the count wins
    let cb = LossCircuitBreaker::new(BreakerConfig {
        max_consecutive_losses: 10,
        max_daily_losses: 1,
        max_daily_loss_pct: 1.0,
        ..Default::default()
    });
    cb.record_outcome(false, 5.0, "AUSDT", "gap").await;
    assert_eq!(
        cb.get_status().await.last_trip_reason,
        Some(TripReason::DailyLossCount { count: 1 })
    );

    // Percent alone
    let cb = LossCircuitBreaker::new(BreakerConfig {
        max_consecutive_losses: 10,
        max_daily_losses: 10,
        max_daily_loss_pct: 1.0,
        ..Default::default()
    });
    cb.record_outcome(false, 5.0, "AUSDT", "gap").await;
    assert_eq!(
        cb.get_status().await.last_trip_reason,
        Some(TripReason::DailyLossPct { pct: 5.0 })
    );
}

/// Concurrent callers never get more HALF_OPEN slots than configured.
#[tokio::test]
async fn half_open_slots_are_not_oversold() {
    let cb = Arc::new(LossCircuitBreaker::new(BreakerConfig {
        cooldown_secs: 0,
        half_open_max_trades: 3,
        ..Default::default()
    }));
    cb.force_open("test").await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cb = Arc::clone(&cb);
        handles.push(tokio::spawn(async move { cb.can_trade().await }));
    }
    let mut admitted = 0;
    for h in handles {
        if h.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(cb.get_status().await.half_open_trade_count, 3);
}

/// The status snapshot is serialisable for operators.
#[tokio::test]
async fn status_serialises() {
    let cb = LossCircuitBreaker::with_defaults();
    cb.force_open("maintenance").await;
    let json = serde_json::to_value(cb.get_status().await).unwrap();
    assert_eq!(json["state"], "OPEN");
    assert_eq!(json["last_trip_reason"]["kind"], "manual");
    assert_eq!(json["cooldown_remaining_secs"], 1_800);
}
