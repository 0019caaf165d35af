//! Session persistence
//!
//! A finished session is stored as pretty-printed JSON so a report can be
//! regenerated without re-running the pipeline. Every map in the session is
//! ordered, so serialize → deserialize → serialize yields identical bytes.

use crate::error::{AuditError, AuditResult};
use crate::models::AuditSession;
use std::path::Path;
use tracing::debug;

pub fn to_json(session: &AuditSession) -> AuditResult<String> {
    serde_json::to_string_pretty(session).map_err(|e| AuditError::Persist(e.to_string()))
}

pub fn from_json(json: &str) -> AuditResult<AuditSession> {
    serde_json::from_str(json).map_err(|e| AuditError::Persist(e.to_string()))
}

/// Write the session atomically (temp file, then rename)
pub async fn save(session: &AuditSession, path: &Path) -> AuditResult<()> {
    let json = to_json(session)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, json.as_bytes()).await?;
    tokio::fs::rename(&temp, path).await?;
    debug!(session_id = %session.session_id, path = %path.display(), "Session saved");
    Ok(())
}

pub async fn load(path: &Path) -> AuditResult<AuditSession> {
    let json = tokio::fs::read_to_string(path).await?;
    from_json(&json)
}
