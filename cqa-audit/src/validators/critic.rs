//! Critic (validation cycle 1)
//!
//! Reviews the phase findings and the session's flags for internal
//! contradictions. Its score reflects confidence in the findings, not the
//! quality of the audited tool.
//!
//! # Checks
//! 1. **Install/run contradiction**: installation failed yet phase 3 commands ran
//! 2. **Unbacked severity**: high or critical flags without evidence
//! 3. **Phase failures**: phases that produced no findings
//!
//! # Scoring Algorithm
//! - Start at 10.0
//! - Contradiction: -2.0 each
//! - Unbacked high/critical flag: -1.0 each
//! - Failed phase: -1.0 each
//! - Clamped to 0.0–10.0, one decimal

use crate::models::{category, RedFlag, Severity};
use crate::types::{CycleError, CycleInput, CycleStage, CycleVerdict, PhaseId, ReviewCycle};
use crate::workflow::scoring::normalize_score;
use async_trait::async_trait;
use tracing::debug;

const CONTRADICTION_PENALTY: f64 = 2.0;
const UNBACKED_FLAG_PENALTY: f64 = 1.0;
const FAILED_PHASE_PENALTY: f64 = 1.0;

/// Internal-consistency critic
#[derive(Debug, Default)]
pub struct Critic;

impl Critic {
    pub fn new() -> Self {
        Self
    }

    /// Pure review over the cycle input
    pub fn assess(&self, input: &CycleInput<'_>) -> CycleVerdict {
        let mut verdict = CycleVerdict::default();
        let mut score = 10.0;

        let installation = input
            .phases
            .get(&PhaseId::Installation)
            .and_then(|r| r.findings.as_ref())
            .and_then(|f| f.as_installation());
        let functionality = input
            .phases
            .get(&PhaseId::Functionality)
            .and_then(|r| r.findings.as_ref())
            .and_then(|f| f.as_functionality());

        if let (Some(install), Some(run)) = (installation, functionality) {
            let ran = run.successful_executions();
            if install.attempted && !install.succeeded && ran > 0 {
                score -= CONTRADICTION_PENALTY;
                verdict.feedback.push(format!(
                    "Critic: installation reported failure yet {} command(s) ran successfully",
                    ran
                ));
                verdict.red_flags.push(
                    RedFlag::new(
                        Severity::Medium,
                        category::VALIDATION,
                        "Contradictory install and run results",
                        "The build command failed but the tool's commands still ran, so either the install check or the run check is wrong.",
                        "Document the supported install path so the build and the shipped entry points agree.",
                    )
                    .with_evidence(format!(
                        "installation: attempted, failed ({}); functionality: {} successful execution(s)",
                        install.command.as_deref().unwrap_or("unknown command"),
                        ran
                    )),
                );
            }
        }

        for flag in input.flags.iter().filter(|f| f.lacks_required_evidence()) {
            score -= UNBACKED_FLAG_PENALTY;
            verdict.feedback.push(format!(
                "Critic: {} flag '{}' carries no evidence",
                flag.severity, flag.title
            ));
        }

        for (phase, result) in input.phases.iter().filter(|(_, r)| !r.success) {
            score -= FAILED_PHASE_PENALTY;
            let reason = result.errors.first().map(String::as_str).unwrap_or("no error recorded");
            verdict
                .feedback
                .push(format!("Critic: phase {} produced no findings ({})", phase, reason));
        }

        if verdict.feedback.is_empty() {
            verdict
                .feedback
                .push("Critic: findings are internally consistent".to_string());
        }

        verdict.score = normalize_score(score);
        debug!(score = verdict.score, added_flags = verdict.red_flags.len(), "Critic review");
        verdict
    }
}

#[async_trait]
impl ReviewCycle for Critic {
    fn stage(&self) -> CycleStage {
        CycleStage::Critic
    }

    async fn review(&self, input: &CycleInput<'_>) -> Result<CycleVerdict, CycleError> {
        Ok(self.assess(input))
    }
}
