//! Phase execution record

use super::findings::PhaseFindings;
use crate::types::PhaseId;
use serde::{Deserialize, Serialize};

/// One phase's execution record
///
/// Built by the runner once the phase returns and never mutated afterwards.
/// `success` says whether the analyzer ran to completion, not whether the
/// audited project passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_id: PhaseId,
    pub success: bool,
    pub duration_ms: u64,
    /// `None` exactly when `success` is false
    pub findings: Option<PhaseFindings>,
    /// Failure message, or soft issues reported by a successful analyzer
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PhaseResult {
    pub fn succeeded(
        phase_id: PhaseId,
        findings: PhaseFindings,
        warnings: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            phase_id,
            success: true,
            duration_ms,
            findings: Some(findings),
            errors: warnings,
        }
    }

    pub fn failed(phase_id: PhaseId, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            phase_id,
            success: false,
            duration_ms,
            findings: None,
            errors: vec![error.into()],
        }
    }

    /// Score contributed to the session, if any
    pub fn score(&self) -> Option<f64> {
        self.findings.as_ref().and_then(PhaseFindings::score)
    }
}
