//! Quality gates over accumulated trade outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason code of a retrain check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    AckMissing,
    AckInvalid,
    AckShaMismatch,
    AckExpired,
    AckOk,
    MinSamples,
    LabelBalance,
    Leakage,
    AuditUnavailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::AckMissing => "ACK_MISSING",
            ReasonCode::AckInvalid => "ACK_INVALID",
            ReasonCode::AckShaMismatch => "ACK_SHA_MISMATCH",
            ReasonCode::AckExpired => "ACK_EXPIRED",
            ReasonCode::AckOk => "ACK_OK",
            ReasonCode::MinSamples => "MIN_SAMPLES",
            ReasonCode::LabelBalance => "LABEL_BALANCE",
            ReasonCode::Leakage => "LEAKAGE",
            ReasonCode::AuditUnavailable => "AUDIT_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub passed: bool,
    pub reason: ReasonCode,
    pub detail: String,
}

impl GateResult {
    pub fn pass(gate: &str, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: true,
            reason,
            detail: detail.into(),
        }
    }

    pub fn fail(gate: &str, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            reason,
            detail: detail.into(),
        }
    }
}

/// Closed trade as reported by the outcome tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcomeRecord {
    pub is_win: bool,
    #[serde(alias = "closed_at")]
    pub timestamp: DateTime<Utc>,
}

pub fn min_samples_gate(outcomes: &[TradeOutcomeRecord], min_samples: usize) -> GateResult {
    let n = outcomes.len();
    if n >= min_samples {
        GateResult::pass("min_samples", ReasonCode::MinSamples, format!("{} >= {} samples", n, min_samples))
    } else {
        GateResult::fail("min_samples", ReasonCode::MinSamples, format!("{} < {} samples", n, min_samples))
    }
}

/// Win rate must sit inside the band; a too-high rate is as suspicious as a too-low one
pub fn label_balance_gate(outcomes: &[TradeOutcomeRecord], min_win_rate: f64, max_win_rate: f64) -> GateResult {
    if outcomes.is_empty() {
        return GateResult::fail("label_balance", ReasonCode::LabelBalance, "no outcomes");
    }
    let wins = outcomes.iter().filter(|o| o.is_win).count();
    let rate = wins as f64 / outcomes.len() as f64;
    let detail = format!(
        "win rate {:.3} ({}/{}) band [{:.2}, {:.2}]",
        rate,
        wins,
        outcomes.len(),
        min_win_rate,
        max_win_rate
    );
    if (min_win_rate..=max_win_rate).contains(&rate) {
        GateResult::pass("label_balance", ReasonCode::LabelBalance, detail)
    } else {
        GateResult::fail("label_balance", ReasonCode::LabelBalance, detail)
    }
}

/// Outcome timestamps must be non-decreasing
pub fn leakage_gate(outcomes: &[TradeOutcomeRecord]) -> GateResult {
    match outcomes
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        Some(i) => GateResult::fail(
            "leakage",
            ReasonCode::Leakage,
            format!(
                "timestamp goes backwards at index {}: {} after {}",
                i + 1,
                outcomes[i + 1].timestamp,
                outcomes[i].timestamp
            ),
        ),
        None => GateResult::pass("leakage", ReasonCode::Leakage, "timestamps monotonic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(wins: &[bool]) -> Vec<TradeOutcomeRecord> {
        let t0 = Utc::now();
        wins.iter()
            .enumerate()
            .map(|(i, &is_win)| TradeOutcomeRecord {
                is_win,
                timestamp: t0 + Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_closed_at_alias() {
        let rec: TradeOutcomeRecord =
            serde_json::from_str(r#"{"is_win":true,"closed_at":"2026-01-02T03:04:05Z"}"#).unwrap();
        assert!(rec.is_win);
        assert_eq!(rec.timestamp.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_label_balance_band() {
        let balanced = series(&[true, false, true, false]);
        assert!(label_balance_gate(&balanced, 0.25, 0.75).passed);

        let too_good = series(&[true, true, true, true, false]);
        let r = label_balance_gate(&too_good, 0.25, 0.75);
        assert!(!r.passed);
        assert_eq!(r.reason, ReasonCode::LabelBalance);

        let too_bad = series(&[false, false, false, false, false]);
        assert!(!label_balance_gate(&too_bad, 0.25, 0.75).passed);
        assert!(!label_balance_gate(&[], 0.25, 0.75).passed);
    }

    #[test]
    fn test_leakage_detects_backwards_time() {
        let mut s = series(&[true, false, true]);
        assert!(leakage_gate(&s).passed);

        // equal timestamps are allowed
        s[2].timestamp = s[1].timestamp;
        assert!(leakage_gate(&s).passed);

        s[2].timestamp = s[0].timestamp - Duration::seconds(1);
        let r = leakage_gate(&s);
        assert!(!r.passed);
        assert!(r.detail.contains("index 2"));
    }

    #[test]
    fn test_min_samples() {
        assert!(!min_samples_gate(&series(&[true; 99]), 100).passed);
        assert!(min_samples_gate(&series(&[true; 100]), 100).passed);
    }
}
