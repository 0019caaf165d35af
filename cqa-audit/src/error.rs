//! Error types for cqa-audit
//!
//! Only a target that cannot be audited at all crosses the orchestrator
//! boundary. Phase and cycle failures are absorbed into the session.

use std::path::PathBuf;
use thiserror::Error;

/// Audit-level error
#[derive(Debug, Error)]
pub enum AuditError {
    /// Target path does not exist
    #[error("Target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    /// Target exists but is not a directory
    #[error("Target is not a directory: {}", .0.display())]
    TargetNotADirectory(PathBuf),

    /// Target exists but cannot be read
    #[error("Target not accessible: {} ({reason})", .path.display())]
    TargetInaccessible { path: PathBuf, reason: String },

    /// Session could not be saved or loaded
    #[error("Persistence error: {0}")]
    Persist(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    /// The audit could not start at all
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            AuditError::TargetNotFound(_)
                | AuditError::TargetNotADirectory(_)
                | AuditError::TargetInaccessible { .. }
        )
    }
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
