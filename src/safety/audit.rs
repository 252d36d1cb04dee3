//! Append-only JSONL audit log of retrain checks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::gates::{GateResult, ReasonCode};
use crate::domain::checksum_of;
use crate::error::Result;

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub check_id: String,
    pub checked_at: DateTime<Utc>,
    pub gate: String,
    pub passed: bool,
    pub reason: ReasonCode,
    pub detail: String,
    pub checksum: String,
}

#[derive(Serialize)]
struct EntryBody<'a> {
    check_id: &'a str,
    checked_at: &'a DateTime<Utc>,
    gate: &'a str,
    passed: bool,
    reason: ReasonCode,
    detail: &'a str,
}

impl AuditEntry {
    pub fn new(check_id: &str, checked_at: DateTime<Utc>, result: &GateResult) -> Result<Self> {
        let checksum = checksum_of(&EntryBody {
            check_id,
            checked_at: &checked_at,
            gate: &result.gate,
            passed: result.passed,
            reason: result.reason,
            detail: &result.detail,
        })?;
        Ok(Self {
            check_id: check_id.to_string(),
            checked_at,
            gate: result.gate.clone(),
            passed: result.passed,
            reason: result.reason,
            detail: result.detail.clone(),
            checksum,
        })
    }
}

pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per result, all written in a single call
    pub async fn append(&self, check_id: &str, checked_at: DateTime<Utc>, results: &[GateResult]) -> Result<()> {
        let mut buf = String::new();
        for result in results {
            let entry = AuditEntry::new(check_id, checked_at, result)?;
            buf.push_str(&serde_json::to_string(&entry)?);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        debug!("Audited {} retrain checks to {:?}", results.len(), self.path);
        Ok(())
    }

    /// Read back all entries; malformed lines are skipped
    pub async fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_one_line_per_result() {
        let path = std::env::temp_dir()
            .join(format!("pumpgate-audit-{}", uuid::Uuid::new_v4()))
            .join("audit.jsonl");
        let log = AuditLog::new(&path);
        let results = vec![
            GateResult::pass("ack", ReasonCode::AckOk, "ok"),
            GateResult::fail("min_samples", ReasonCode::MinSamples, "3 < 100 samples"),
        ];
        log.append("c1", Utc::now(), &results).await.unwrap();
        log.append("c2", Utc::now(), &results[..1]).await.unwrap();

        let entries = log.read_entries().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].reason, ReasonCode::MinSamples);
        assert!(!entries[1].passed);
        assert_ne!(entries[0].checksum, entries[2].checksum);

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
