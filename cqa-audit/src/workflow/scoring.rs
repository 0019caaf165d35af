//! Scoring Engine
//!
//! Turns heterogeneous phase results plus a red-flag count into one
//! comparable 0–10 score. Pure and deterministic: no I/O, no clock.
//!
//! # Scoring Algorithm
//! - **Phase weights** (scorable phases only):
//!   - first-impressions 0.15
//!   - installation 0.25
//!   - functionality 0.35
//!   - verification 0.15
//! - **Base score**: weighted mean over the phases that produced a score.
//!   Missing phases are excluded from both numerator and denominator, so a
//!   failed phase is not penalized a second time by dilution.
//! - **Red-flag penalty**: `min(count × 0.1, 2.0)`, severity-blind. Severity
//!   weighting happens in the evidence arbiter, which uses its own
//!   (different) penalty with a 3.0 cap.
//! - **Final**: `max(0, base − penalty)`, rounded to one decimal.

use crate::models::PhaseResult;
use crate::types::PhaseId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Penalty per red flag
pub const PENALTY_PER_FLAG: f64 = 0.1;

/// Upper bound on the red-flag penalty
pub const MAX_FLAG_PENALTY: f64 = 2.0;

/// Highest attainable score
pub const MAX_SCORE: f64 = 10.0;

/// Round to one decimal place
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Clamp into [0, 10] and round to one decimal
pub fn normalize_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    round_one_decimal(value.clamp(0.0, MAX_SCORE))
}

/// Severity-blind flag penalty
pub fn flag_penalty(red_flag_count: usize) -> f64 {
    (red_flag_count as f64 * PENALTY_PER_FLAG).min(MAX_FLAG_PENALTY)
}

/// Intermediate values of one scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted mean of contributing phases (unrounded)
    pub base_score: f64,
    pub weight_used: f64,
    pub penalty: f64,
    pub final_score: f64,
    /// Phases that contributed, with their scores
    pub contributions: Vec<(PhaseId, f64)>,
    pub red_flag_count: usize,
}

impl ScoreBreakdown {
    pub fn phases_scored(&self) -> usize {
        self.contributions.len()
    }

    /// Detailed report for logs and persisted audit trails
    pub fn report(&self) -> serde_json::Value {
        let phases: serde_json::Map<String, serde_json::Value> = self
            .contributions
            .iter()
            .map(|(phase, score)| {
                (
                    phase.as_str().to_string(),
                    json!({ "score": score, "weight": phase.weight() }),
                )
            })
            .collect();

        json!({
            "scorer": "ScoringEngine",
            "base_score": self.base_score,
            "weight_used": self.weight_used,
            "penalty": self.penalty,
            "final_score": self.final_score,
            "red_flag_count": self.red_flag_count,
            "phases": phases,
        })
    }
}

/// Compute the pre-validation session score
///
/// Phase scores outside [0, 10] are clamped before weighting.
pub fn score_session(
    phases: &BTreeMap<PhaseId, PhaseResult>,
    red_flag_count: usize,
) -> ScoreBreakdown {
    let mut weighted_sum = 0.0;
    let mut weight_used = 0.0;
    let mut contributions = Vec::new();

    for (phase, result) in phases {
        let (Some(weight), Some(score)) = (phase.weight(), result.score()) else {
            continue;
        };
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, MAX_SCORE) };
        weighted_sum += score * weight;
        weight_used += weight;
        contributions.push((*phase, score));
    }

    let base_score = if weight_used > 0.0 {
        weighted_sum / weight_used
    } else {
        0.0
    };

    let penalty = flag_penalty(red_flag_count);
    let final_score = round_one_decimal((base_score - penalty).max(0.0).min(MAX_SCORE));

    debug!(
        base_score,
        weight_used,
        penalty,
        final_score,
        phases_scored = contributions.len(),
        "Session scoring complete"
    );

    ScoreBreakdown {
        base_score,
        weight_used,
        penalty,
        final_score,
        contributions,
        red_flag_count,
    }
}

/// Letter grade derived from a final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Grade::A
        } else if score >= 8.0 {
            Grade::B
        } else if score >= 7.0 {
            Grade::C
        } else if score >= 6.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

// ============================================================================
// Tests
// ============================================================================
