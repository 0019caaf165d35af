//! Validation protocol results

use super::red_flag::RedFlag;
use crate::types::CycleStage;
use serde::{Deserialize, Serialize};

/// Score at or above which a validated audit passes
pub const PASS_THRESHOLD: f64 = 6.0;

/// Score given to a cycle that failed internally
pub const NEUTRAL_CYCLE_SCORE: f64 = 5.0;

/// One stage of the validation protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_name: CycleStage,
    pub score: f64,
    #[serde(default)]
    pub feedback: Vec<String>,
    /// Flags this cycle alone introduced
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
    pub duration_ms: u64,
    /// False when the cycle failed and the neutral score was substituted
    #[serde(default = "default_true")]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

/// Outcome of the three-cycle consensus protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `score >= 6.0`
    pub passed: bool,
    /// Authoritative score, replaces the scoring-engine score
    pub score: f64,
    /// Every cycle's feedback, in cycle order
    #[serde(default)]
    pub feedback: Vec<String>,
    /// Flags discovered during validation, appended to the session
    #[serde(default)]
    pub additional_flags: Vec<RedFlag>,
    /// Critic, meta-critic, arbiter, in that order
    pub cycles: Vec<CycleResult>,
    /// Cancellation stopped the protocol before the arbiter ran
    #[serde(default)]
    pub truncated: bool,
}

impl ValidationResult {
    pub fn cycle(&self, stage: CycleStage) -> Option<&CycleResult> {
        self.cycles.iter().find(|c| c.cycle_name == stage)
    }
}
