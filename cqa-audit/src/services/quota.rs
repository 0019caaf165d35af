//! License/quota collaborator
//!
//! The audit core never enforces quotas. The caller asks `may_run_audit`
//! before starting an audit and calls `record_audit` after it completes.
//! `UsageLedger` is the file-backed implementation used by the CLI: a small
//! JSON document holding the current month's count, rewritten atomically.

use crate::models::Tier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Quota collaborator error
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger file exists but cannot be parsed
    #[error("Usage ledger corrupt: {0}")]
    Corrupt(String),

    #[error("Monthly audit limit reached for {tier} tier ({limit} audits)")]
    Exceeded { tier: Tier, limit: u32 },
}

/// Quota gate consulted by the caller around each audit
#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Whether another audit is allowed this month for `tier`
    async fn may_run_audit(&self, tier: Tier) -> Result<bool, QuotaError>;

    /// Count a completed audit of `target`
    async fn record_audit(&self, target: &Path) -> Result<(), QuotaError>;
}

/// `may_run_audit` as a `Result`, `Exceeded` when the answer is no
pub async fn ensure_allowed(gate: &dyn QuotaGate, tier: Tier) -> Result<(), QuotaError> {
    if gate.may_run_audit(tier).await? {
        return Ok(());
    }
    Err(QuotaError::Exceeded {
        tier,
        limit: tier.monthly_limit().unwrap_or(u32::MAX),
    })
}

/// One recorded audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub target: PathBuf,
    pub at: DateTime<Utc>,
}

/// Persisted ledger document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Calendar month the count applies to, `YYYY-MM`
    pub month: String,
    pub count: u32,
    #[serde(default)]
    pub audits: Vec<AuditEntry>,
}

impl UsageRecord {
    pub fn empty(month: String) -> Self {
        Self {
            month,
            count: 0,
            audits: Vec::new(),
        }
    }
}

/// `YYYY-MM` of a timestamp
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// File-backed monthly usage counter
///
/// A mutex serializes read-modify-write within the process; writes go through
/// a temp file and a rename so a crash never leaves a half-written ledger.
pub struct UsageLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Usage for the month containing `now`; a ledger from an earlier month reads as empty
    pub async fn usage_at(&self, now: DateTime<Utc>) -> Result<UsageRecord, QuotaError> {
        let _guard = self.lock.lock().await;
        self.load(now).await
    }

    pub async fn may_run_audit_at(&self, tier: Tier, now: DateTime<Utc>) -> Result<bool, QuotaError> {
        let Some(limit) = tier.monthly_limit() else {
            return Ok(true);
        };
        let usage = self.usage_at(now).await?;
        debug!(tier = %tier, used = usage.count, limit, "Quota check");
        Ok(usage.count < limit)
    }

    pub async fn record_audit_at(&self, target: &Path, now: DateTime<Utc>) -> Result<UsageRecord, QuotaError> {
        let _guard = self.lock.lock().await;
        let mut usage = self.load(now).await?;
        usage.count += 1;
        usage.audits.push(AuditEntry {
            target: target.to_path_buf(),
            at: now,
        });
        self.store(&usage).await?;
        info!(month = %usage.month, count = usage.count, "Audit recorded");
        Ok(usage)
    }

    async fn load(&self, now: DateTime<Utc>) -> Result<UsageRecord, QuotaError> {
        let month = month_key(now);
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UsageRecord::empty(month)),
            Err(e) => return Err(e.into()),
        };

        let record: UsageRecord =
            serde_json::from_str(&text).map_err(|e| QuotaError::Corrupt(e.to_string()))?;
        if record.month != month {
            debug!(stored = %record.month, current = %month, "Usage ledger rolled over");
            return Ok(UsageRecord::empty(month));
        }
        Ok(record)
    }

    async fn store(&self, record: &UsageRecord) -> Result<(), QuotaError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(record).map_err(|e| QuotaError::Corrupt(e.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl QuotaGate for UsageLedger {
    async fn may_run_audit(&self, tier: Tier) -> Result<bool, QuotaError> {
        self.may_run_audit_at(tier, Utc::now()).await
    }

    async fn record_audit(&self, target: &Path) -> Result<(), QuotaError> {
        self.record_audit_at(target, Utc::now()).await.map(|_| ())
    }
}
