//! Evidence arbiter (validation cycle 3)
//!
//! Produces the authoritative score. Starts from the phase-weighted base score
//! and subtracts a severity-weighted penalty over every accumulated flag
//! (session, critic and meta-critic).
//!
//! # Scoring Algorithm
//! - **Base**: weighted phase mean, re-normalized over phases that scored
//! - **Penalty** per flag: critical 1.0, high 0.5, medium 0.25, low 0.1;
//!   halved when the flag carries no evidence
//! - **Cap**: total penalty at most 3.0
//! - **Final**: `max(0, base − penalty)`, one decimal
//!
//! This penalty differs from the scoring engine's flat 0.1-per-flag penalty
//! (capped at 2.0). Both are kept as they are.

use crate::models::RedFlag;
use crate::types::{CycleError, CycleInput, CycleStage, CycleVerdict, ReviewCycle};
use crate::workflow::scoring::{normalize_score, score_session};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Upper bound on the arbiter's evidence penalty
pub const MAX_EVIDENCE_PENALTY: f64 = 3.0;

/// Severity-weighted penalty over `flags`, capped
pub fn evidence_penalty(flags: &[RedFlag]) -> f64 {
    flags
        .iter()
        .map(RedFlag::severity_weight)
        .sum::<f64>()
        .min(MAX_EVIDENCE_PENALTY)
}

/// Evidence-sufficiency scorer
#[derive(Debug, Default)]
pub struct EvidenceArbiter;

impl EvidenceArbiter {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, input: &CycleInput<'_>) -> CycleVerdict {
        let breakdown = score_session(input.phases, 0);
        let penalty = evidence_penalty(input.flags);
        let score = normalize_score((breakdown.base_score - penalty).max(0.0));
        let unbacked = input.flags.iter().filter(|f| f.evidence.is_empty()).count();

        let report = json!({
            "scorer": "EvidenceArbiter",
            "base_score": breakdown.base_score,
            "phases_scored": breakdown.phases_scored(),
            "flags": input.flags.len(),
            "flags_without_evidence": unbacked,
            "penalty": penalty,
            "score": score,
        });
        debug!(report = %report, "Arbiter review");

        CycleVerdict {
            score,
            feedback: vec![format!(
                "Arbiter: base {:.1} over {} phase(s), evidence penalty {:.2} across {} flag(s) ({} without evidence), score {:.1}",
                breakdown.base_score,
                breakdown.phases_scored(),
                penalty,
                input.flags.len(),
                unbacked,
                score
            )],
            red_flags: Vec::new(),
        }
    }
}

#[async_trait]
impl ReviewCycle for EvidenceArbiter {
    fn stage(&self) -> CycleStage {
        CycleStage::Arbiter
    }

    async fn review(&self, input: &CycleInput<'_>) -> Result<CycleVerdict, CycleError> {
        Ok(self.assess(input))
    }
}
