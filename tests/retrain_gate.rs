use chrono::{Duration, Utc};
use pumpgate::safety::{
    AuditLog, ReasonCode, RetrainAck, RetrainGate, RetrainGateConfig, TradeOutcomeRecord,
};
use std::path::PathBuf;

struct Sandbox {
    dir: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("pumpgate-retrain-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn config(&self) -> RetrainGateConfig {
        RetrainGateConfig {
            ack_path: self.dir.join("ack.json"),
            audit_log_path: self.dir.join("audit").join("retrain.jsonl"),
            ..Default::default()
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn outcomes(n: usize) -> Vec<TradeOutcomeRecord> {
    let t0 = Utc::now() - Duration::days(7);
    (0..n)
        .map(|i| TradeOutcomeRecord {
            is_win: i % 2 == 0,
            timestamp: t0 + Duration::minutes(i as i64),
        })
        .collect()
}

/// A valid ack and healthy outcomes permit retraining, with every check audited.
#[tokio::test]
async fn valid_ack_and_gates_allow() {
    let sb = Sandbox::new();
    let config = sb.config();
    RetrainAck::issue("weekly refresh", "ops-7", Duration::hours(2))
        .unwrap()
        .write_to(&config.ack_path)
        .await
        .unwrap();

    let gate = RetrainGate::new(config.clone());
    let permission = gate.check_all(&outcomes(120)).await;
    assert!(permission.allowed, "{:?}", permission.blocking_gates);
    assert_eq!(permission.gates.len(), 4);
    assert!(permission.ack.is_some());

    let entries = AuditLog::new(&config.audit_log_path).read_entries().await.unwrap();
    assert_eq!(entries.len(), 4, "one audit line per check");
    assert!(entries.iter().all(|e| e.checksum.starts_with("sha256:")));
}

/// A tampered ack is ACK_SHA_MISMATCH and quality gates are not evaluated.
#[tokio::test]
async fn tampered_ack_short_circuits() {
    let sb = Sandbox::new();
    let config = sb.config();
    let mut ack = RetrainAck::issue("weekly refresh", "ops-7", Duration::hours(2)).unwrap();
    ack.expires_at = ack.expires_at + Duration::days(30);
    ack.write_to(&config.ack_path).await.unwrap();

    let permission = RetrainGate::new(config).check_all(&outcomes(3)).await;
    assert!(!permission.allowed);
    assert_eq!(permission.gates.len(), 1, "quality gates must not run");
    assert_eq!(permission.gates[0].reason, ReasonCode::AckShaMismatch);
    assert_eq!(permission.blocking_gates, vec!["ack:ACK_SHA_MISMATCH".to_string()]);
    assert!(permission.ack.is_none());
}

/// An expired ack is ACK_EXPIRED and quality gates are not evaluated.
#[tokio::test]
async fn expired_ack_short_circuits() {
    let sb = Sandbox::new();
    let config = sb.config();
    let now = Utc::now();
    RetrainAck::issue_at("old", "ops-7", Duration::hours(1), now - Duration::hours(3))
        .unwrap()
        .write_to(&config.ack_path)
        .await
        .unwrap();

    let permission = RetrainGate::new(config).check_all_at(&outcomes(200), now).await;
    assert!(!permission.allowed);
    assert_eq!(permission.gates.len(), 1);
    assert_eq!(permission.gates[0].reason, ReasonCode::AckExpired);
}

/// Missing ack is never treated as valid.
#[tokio::test]
async fn missing_ack_denies() {
    let sb = Sandbox::new();
    let permission = RetrainGate::new(sb.config()).check_all(&outcomes(200)).await;
    assert!(!permission.allowed);
    assert_eq!(permission.gates[0].reason, ReasonCode::AckMissing);
}

/// With a valid ack, every failing quality gate is reported.
#[tokio::test]
async fn quality_gates_aggregate() {
    let sb = Sandbox::new();
    let config = sb.config();
    RetrainAck::issue("refresh", "ops", Duration::hours(1))
        .unwrap()
        .write_to(&config.ack_path)
        .await
        .unwrap();

    let mut data = outcomes(10);
    for o in data.iter_mut() {
        o.is_win = true;
    }
    data.swap(3, 4);

    let permission = RetrainGate::new(config).check_all(&data).await;
    assert!(!permission.allowed);
    let mut blocking = permission.blocking_gates.clone();
    blocking.sort();
    assert_eq!(
        blocking,
        vec![
            "label_balance:LABEL_BALANCE".to_string(),
            "leakage:LEAKAGE".to_string(),
            "min_samples:MIN_SAMPLES".to_string(),
        ]
    );
}

/// An unwritable audit log denies an otherwise valid retrain.
#[tokio::test]
async fn audit_failure_denies() {
    let sb = Sandbox::new();
    let mut config = sb.config();
    RetrainAck::issue("refresh", "ops", Duration::hours(1))
        .unwrap()
        .write_to(&config.ack_path)
        .await
        .unwrap();
    // A directory where the log file should be
    config.audit_log_path = sb.dir.clone();

    let permission = RetrainGate::new(config).check_all(&outcomes(120)).await;
    assert!(!permission.allowed);
    assert_eq!(
        permission.gates.last().map(|g| g.reason),
        Some(ReasonCode::AuditUnavailable)
    );
}
