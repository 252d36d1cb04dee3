//! Operator retrain acknowledgment
//!
//! A small JSON file carrying a checksum over its own content and an expiry.
//! Anything that fails to read, parse or verify is treated as invalid.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::gates::{GateResult, ReasonCode};
use crate::domain::checksum_of;
use crate::error::{PumpGateError, Result};

const GATE: &str = "ack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainAck {
    pub change_reason: String,
    pub operator_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub checksum: String,
}

/// Checksummed fields, in declaration order
#[derive(Serialize)]
struct AckBody<'a> {
    change_reason: &'a str,
    operator_id: &'a str,
    created_at: &'a DateTime<Utc>,
    expires_at: &'a DateTime<Utc>,
}

impl RetrainAck {
    /// Create a signed ack valid for `ttl`
    pub fn issue(change_reason: &str, operator_id: &str, ttl: Duration) -> Result<Self> {
        Self::issue_at(change_reason, operator_id, ttl, Utc::now())
    }

    /// Operator-supplied TTL in hours; out-of-range values are rejected
    pub fn ttl_hours(hours: i64) -> Result<Duration> {
        Duration::try_hours(hours).ok_or_else(|| {
            PumpGateError::Validation(format!("ack ttl of {} hours is out of range", hours))
        })
    }

    pub fn issue_at(change_reason: &str, operator_id: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Self> {
        if change_reason.trim().is_empty() || operator_id.trim().is_empty() {
            return Err(PumpGateError::Validation(
                "ack needs a change reason and an operator id".to_string(),
            ));
        }
        if ttl <= Duration::zero() {
            return Err(PumpGateError::Validation("ack ttl must be positive".to_string()));
        }
        let created_at = now.trunc_subsecs(0);
        let expires_at = created_at.checked_add_signed(ttl).ok_or_else(|| {
            PumpGateError::Validation("ack ttl runs past the representable date range".to_string())
        })?;
        let mut ack = Self {
            change_reason: change_reason.trim().to_string(),
            operator_id: operator_id.trim().to_string(),
            created_at,
            expires_at,
            checksum: String::new(),
        };
        ack.checksum = ack.compute_checksum()?;
        Ok(ack)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        Ok(checksum_of(&AckBody {
            change_reason: &self.change_reason,
            operator_id: &self.operator_id,
            created_at: &self.created_at,
            expires_at: &self.expires_at,
        })?)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        info!("Wrote retrain ack by {} to {:?}", self.operator_id, path);
        Ok(())
    }

    /// Check the ack at `path`. Returns the parsed ack when it could be read,
    /// even if it failed verification, for audit purposes.
    pub async fn verify_file(path: &Path, now: DateTime<Utc>) -> (Option<RetrainAck>, GateResult) {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (
                    None,
                    GateResult::fail(GATE, ReasonCode::AckMissing, format!("no ack at {}", path.display())),
                );
            }
            Err(e) => {
                return (
                    None,
                    GateResult::fail(GATE, ReasonCode::AckInvalid, format!("unreadable ack: {}", e)),
                );
            }
        };

        let ack: RetrainAck = match serde_json::from_str(&content) {
            Ok(ack) => ack,
            Err(e) => {
                debug!("Ack parse failure: {}", e);
                return (
                    None,
                    GateResult::fail(GATE, ReasonCode::AckInvalid, format!("malformed ack: {}", e)),
                );
            }
        };

        let result = ack.verify(now);
        (Some(ack), result)
    }

    /// Field, checksum and expiry checks, in that order
    pub fn verify(&self, now: DateTime<Utc>) -> GateResult {
        if self.change_reason.trim().is_empty() || self.operator_id.trim().is_empty() {
            return GateResult::fail(GATE, ReasonCode::AckInvalid, "empty change reason or operator id");
        }
        if self.expires_at <= self.created_at {
            return GateResult::fail(GATE, ReasonCode::AckInvalid, "expires_at is not after created_at");
        }

        match self.compute_checksum() {
            Ok(expected) if expected == self.checksum => {}
            Ok(expected) => {
                return GateResult::fail(
                    GATE,
                    ReasonCode::AckShaMismatch,
                    format!("checksum {} != computed {}", self.checksum, expected),
                );
            }
            Err(e) => {
                return GateResult::fail(GATE, ReasonCode::AckInvalid, format!("checksum failed: {}", e));
            }
        }

        if self.is_expired_at(now) {
            return GateResult::fail(
                GATE,
                ReasonCode::AckExpired,
                format!("expired at {}", self.expires_at.to_rfc3339()),
            );
        }

        GateResult::pass(
            GATE,
            ReasonCode::AckOk,
            format!("ack by {} valid until {}", self.operator_id, self.expires_at.to_rfc3339()),
        )
    }
}
