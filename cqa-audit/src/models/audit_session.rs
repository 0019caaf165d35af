//! Audit session (root aggregate of one audit run)
//!
//! A session is owned by exactly one orchestrator call. Phase results are
//! inserted once each, flags only ever grow, and `completed_at` is set once.

use super::findings::PhaseFindings;
use super::options::AuditOptions;
use super::phase_result::PhaseResult;
use super::red_flag::{RedFlag, SeverityCounts};
use super::validation::ValidationResult;
use crate::types::PhaseId;
use crate::workflow::scoring::Grade;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// One complete run of the pipeline against one target path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Absolute path of the inspected project
    pub target_path: PathBuf,

    pub options: AuditOptions,

    /// Phase results keyed by phase; iteration order is execution order
    pub phase_findings: BTreeMap<PhaseId, PhaseResult>,

    /// Phase flags in discovery order, then validation flags
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,

    /// Final 0–10 score, one decimal; set once scoring completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Scoring-engine score before any validation override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_validation_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Cancellation stopped the pipeline early
    #[serde(default)]
    pub truncated: bool,
}

impl AuditSession {
    /// Create new audit session
    pub fn new(target_path: PathBuf, options: AuditOptions) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target_path,
            options,
            phase_findings: BTreeMap::new(),
            red_flags: Vec::new(),
            score: None,
            pre_validation_score: None,
            validation: None,
            started_at: Utc::now(),
            completed_at: None,
            truncated: false,
        }
    }

    /// Record a phase result. A phase already recorded is left untouched.
    pub fn record_phase(&mut self, result: PhaseResult) -> bool {
        if self.phase_findings.contains_key(&result.phase_id) {
            return false;
        }
        self.phase_findings.insert(result.phase_id, result);
        true
    }

    pub fn phase(&self, phase: PhaseId) -> Option<&PhaseResult> {
        self.phase_findings.get(&phase)
    }

    pub fn findings(&self, phase: PhaseId) -> Option<&PhaseFindings> {
        self.phase(phase).and_then(|r| r.findings.as_ref())
    }

    /// Phases that ran to completion
    pub fn completed_phases(&self) -> usize {
        self.phase_findings.values().filter(|r| r.success).count()
    }

    /// Mark the session complete. Returns false if it already was.
    pub fn complete(&mut self) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Letter grade for the final score
    pub fn grade(&self) -> Option<Grade> {
        self.score.map(Grade::from_score)
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::from_flags(&self.red_flags)
    }

    /// Wall-clock duration, once complete
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
