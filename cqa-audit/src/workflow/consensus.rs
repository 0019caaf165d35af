//! Consensus protocol
//!
//! Three review cycles run exactly once each, in the fixed order
//! critic → meta-critic → arbiter. Each cycle sees the session's flags plus
//! every flag added by the cycles before it. The arbiter's score is the
//! authoritative result; the other two scores are recorded for the audit
//! trail only.
//!
//! A cycle that errors, panics or exceeds its time cap contributes the neutral
//! score 5.0 and a feedback entry describing the failure. The protocol itself
//! never fails.

use crate::models::{
    AuditOptions, CycleResult, PhaseResult, RedFlag, ValidationResult, NEUTRAL_CYCLE_SCORE,
    PASS_THRESHOLD,
};
use crate::types::{CycleError, CycleInput, CycleStage, CycleVerdict, PhaseId, ReviewCycle};
use crate::validators::{Critic, EvidenceArbiter, MetaCritic};
use crate::workflow::runner::panic_message;
use crate::workflow::scoring::normalize_score;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default wall-clock cap per cycle
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Session state the protocol reviews
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub target_path: &'a Path,
    pub options: &'a AuditOptions,
    pub phases: &'a BTreeMap<PhaseId, PhaseResult>,
    pub flags: &'a [RedFlag],
    pub pre_validation_score: f64,
}

/// Critic, meta-critic and arbiter in fixed slots
pub struct ConsensusProtocol {
    critic: Box<dyn ReviewCycle>,
    meta_critic: Box<dyn ReviewCycle>,
    arbiter: Box<dyn ReviewCycle>,
    cycle_timeout: Duration,
}

impl ConsensusProtocol {
    pub fn new(
        critic: Box<dyn ReviewCycle>,
        meta_critic: Box<dyn ReviewCycle>,
        arbiter: Box<dyn ReviewCycle>,
    ) -> Self {
        for (slot, cycle) in [
            (CycleStage::Critic, &critic),
            (CycleStage::MetaCritic, &meta_critic),
            (CycleStage::Arbiter, &arbiter),
        ] {
            if cycle.stage() != slot {
                warn!(slot = %slot, declared = %cycle.stage(), "Review cycle installed in another stage's slot");
            }
        }

        Self {
            critic,
            meta_critic,
            arbiter,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
        }
    }

    /// Protocol wired with the bundled rule-based cycles
    pub fn reference() -> Self {
        Self::new(
            Box::new(Critic::new()),
            Box::new(MetaCritic::new()),
            Box::new(EvidenceArbiter::new()),
        )
    }

    pub fn with_cycle_timeout(mut self, cycle_timeout: Duration) -> Self {
        self.cycle_timeout = cycle_timeout;
        self
    }

    pub fn cycle_timeout(&self) -> Duration {
        self.cycle_timeout
    }

    /// Run all three cycles
    ///
    /// Cancellation is checked before each cycle. If the arbiter never runs the
    /// result is marked `truncated` and carries the pre-validation score.
    pub async fn run(&self, request: ValidationRequest<'_>, cancel: &CancellationToken) -> ValidationResult {
        let mut accumulated: Vec<RedFlag> = request.flags.to_vec();
        let mut cycles: Vec<CycleResult> = Vec::with_capacity(CycleStage::ALL.len());

        let stages: [(CycleStage, &dyn ReviewCycle); 3] = [
            (CycleStage::Critic, self.critic.as_ref()),
            (CycleStage::MetaCritic, self.meta_critic.as_ref()),
            (CycleStage::Arbiter, self.arbiter.as_ref()),
        ];

        for (stage, cycle) in stages {
            if cancel.is_cancelled() {
                info!(stage = %stage, "Validation cancelled before cycle");
                break;
            }

            let started = Instant::now();
            let outcome = {
                let input = CycleInput {
                    target_path: request.target_path,
                    options: request.options,
                    phases: request.phases,
                    flags: &accumulated,
                    previous: &cycles,
                    pre_validation_score: request.pre_validation_score,
                };
                self.execute(stage, cycle, &input).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(verdict) => {
                    let (kept, dropped): (Vec<RedFlag>, Vec<RedFlag>) =
                        verdict.red_flags.into_iter().partition(RedFlag::is_reportable);
                    if !dropped.is_empty() {
                        warn!(stage = %stage, dropped = dropped.len(), "Dropped flags without title or fix");
                    }
                    let score = normalize_score(verdict.score);
                    info!(stage = %stage, score, added_flags = kept.len(), duration_ms, "Review cycle completed");
                    CycleResult {
                        cycle_name: stage,
                        score,
                        feedback: verdict.feedback,
                        red_flags: kept,
                        duration_ms,
                        completed: true,
                    }
                }
                Err(e) => {
                    warn!(stage = %stage, error = %e, duration_ms, "Review cycle failed, using neutral score");
                    CycleResult {
                        cycle_name: stage,
                        score: NEUTRAL_CYCLE_SCORE,
                        feedback: vec![format!(
                            "{} failed ({}); neutral score {:.1} substituted",
                            stage, e, NEUTRAL_CYCLE_SCORE
                        )],
                        red_flags: Vec::new(),
                        duration_ms,
                        completed: false,
                    }
                }
            };

            accumulated.extend(result.red_flags.iter().cloned());
            cycles.push(result);
        }

        let arbiter_score = cycles
            .iter()
            .find(|c| c.cycle_name == CycleStage::Arbiter)
            .map(|c| c.score);
        let truncated = arbiter_score.is_none();
        let score = arbiter_score.unwrap_or(request.pre_validation_score);

        let feedback = cycles.iter().flat_map(|c| c.feedback.iter().cloned()).collect();
        let additional_flags = cycles.iter().flat_map(|c| c.red_flags.iter().cloned()).collect();

        debug!(cycles = cycles.len(), truncated, "Consensus assembled");

        ValidationResult {
            passed: score >= PASS_THRESHOLD,
            score,
            feedback,
            additional_flags,
            cycles,
            truncated,
        }
    }

    async fn execute(
        &self,
        stage: CycleStage,
        cycle: &dyn ReviewCycle,
        input: &CycleInput<'_>,
    ) -> Result<CycleVerdict, CycleError> {
        debug!(stage = %stage, flags = input.flags.len(), "Review cycle started");
        let guarded = AssertUnwindSafe(cycle.review(input)).catch_unwind();
        match tokio::time::timeout(self.cycle_timeout, guarded).await {
            Err(_) => Err(CycleError::Timeout {
                stage,
                seconds: self.cycle_timeout.as_secs(),
            }),
            Ok(Err(panic)) => Err(CycleError::Panicked {
                stage,
                message: panic_message(panic.as_ref()),
            }),
            Ok(Ok(verdict)) => verdict,
        }
    }
}

impl Default for ConsensusProtocol {
    fn default() -> Self {
        Self::reference()
    }
}
