//! Retrain gate
//!
//! Decides whether the feedback-learning loop may replace the production
//! model. Two independent requirements: a valid operator acknowledgment and
//! passing quality gates over the accumulated outcomes. An ack failure short
//! circuits the quality gates. Every check is written to the audit log; if the
//! log cannot be written, permission is denied.

mod ack;
mod audit;
mod gates;

pub use ack::RetrainAck;
pub use audit::{AuditEntry, AuditLog};
pub use gates::{
    label_balance_gate, leakage_gate, min_samples_gate, GateResult, ReasonCode, TradeOutcomeRecord,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainGateConfig {
    pub ack_path: PathBuf,
    pub audit_log_path: PathBuf,
    pub min_samples: usize,
    pub min_win_rate: f64,
    pub max_win_rate: f64,
}

impl Default for RetrainGateConfig {
    fn default() -> Self {
        Self {
            ack_path: PathBuf::from("data/retrain_ack.json"),
            audit_log_path: PathBuf::from("data/retrain_audit.jsonl"),
            min_samples: 100,
            min_win_rate: 0.25,
            max_win_rate: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainPermission {
    pub allowed: bool,
    pub ack: Option<RetrainAck>,
    pub gates: Vec<GateResult>,
    pub blocking_gates: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct RetrainGate {
    config: RetrainGateConfig,
    audit: AuditLog,
}

impl RetrainGate {
    pub fn new(config: RetrainGateConfig) -> Self {
        let audit = AuditLog::new(config.audit_log_path.clone());
        Self { config, audit }
    }

    pub fn config(&self) -> &RetrainGateConfig {
        &self.config
    }

    pub async fn check_all(&self, outcomes: &[TradeOutcomeRecord]) -> RetrainPermission {
        self.check_all_at(outcomes, Utc::now()).await
    }

    pub async fn check_all_at(&self, outcomes: &[TradeOutcomeRecord], now: DateTime<Utc>) -> RetrainPermission {
        let (ack, ack_result) = RetrainAck::verify_file(&self.config.ack_path, now).await;
        let ack_ok = ack_result.passed;
        let mut gates = vec![ack_result];

        if ack_ok {
            gates.push(min_samples_gate(outcomes, self.config.min_samples));
            gates.push(label_balance_gate(
                outcomes,
                self.config.min_win_rate,
                self.config.max_win_rate,
            ));
            gates.push(leakage_gate(outcomes));
        }

        let check_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self.audit.append(&check_id, now, &gates).await {
            warn!("Retrain audit log unavailable, denying: {}", e);
            gates.push(GateResult::fail(
                "audit",
                ReasonCode::AuditUnavailable,
                format!("{}: {}", self.audit.path().display(), e),
            ));
        }

        let blocking_gates: Vec<String> = gates
            .iter()
            .filter(|g| !g.passed)
            .map(|g| format!("{}:{}", g.gate, g.reason))
            .collect();
        let allowed = blocking_gates.is_empty();

        if allowed {
            info!("Retrain permitted ({} outcomes, check {})", outcomes.len(), check_id);
        } else {
            warn!("Retrain blocked: {}", blocking_gates.join(", "));
        }

        RetrainPermission {
            allowed,
            ack: if ack_ok { ack } else { None },
            gates,
            blocking_gates,
            checked_at: now,
        }
    }
}
