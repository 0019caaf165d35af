//! Meta-critic (validation cycle 2)
//!
//! Reviews the critic's output and the flag set for bias and missed context.
//!
//! # Checks
//! 1. **Category dominance**: one category holds ≥ 75% of at least 4 flags
//! 2. **Missing context**: unverifiable claims while no domain context was given
//! 3. **Severity inflation**: the critic added high/critical flags without evidence
//!
//! # Scoring Algorithm
//! Start at 10.0; dominance -1.5, missing context -1.0, each inflated critic
//! flag -1.0. Clamped and rounded like every cycle score.

use crate::models::{category, RedFlag, Severity};
use crate::types::{CycleError, CycleInput, CycleStage, CycleVerdict, PhaseId, ReviewCycle};
use crate::workflow::scoring::normalize_score;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

const DOMINANCE_MIN_FLAGS: usize = 4;
const DOMINANCE_SHARE: f64 = 0.75;
const DOMINANCE_PENALTY: f64 = 1.5;
const MISSING_CONTEXT_PENALTY: f64 = 1.0;
const INFLATION_PENALTY: f64 = 1.0;

/// Bias and missed-context reviewer
#[derive(Debug, Default)]
pub struct MetaCritic;

impl MetaCritic {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, input: &CycleInput<'_>) -> CycleVerdict {
        let mut verdict = CycleVerdict::default();
        let mut score = 10.0;

        if input.flags.len() >= DOMINANCE_MIN_FLAGS {
            let mut per_category: BTreeMap<&str, usize> = BTreeMap::new();
            for flag in input.flags {
                *per_category.entry(flag.category.as_str()).or_default() += 1;
            }
            if let Some((dominant, count)) = per_category.iter().max_by_key(|(_, count)| **count) {
                let share = *count as f64 / input.flags.len() as f64;
                if share >= DOMINANCE_SHARE {
                    score -= DOMINANCE_PENALTY;
                    verdict.feedback.push(format!(
                        "Meta-critic: {} of {} flags are '{}'; other areas may be under-examined",
                        count,
                        input.flags.len(),
                        dominant
                    ));
                }
            }
        }

        let unverified = input
            .phases
            .get(&PhaseId::Verification)
            .and_then(|r| r.findings.as_ref())
            .and_then(|f| f.as_verification())
            .map(|v| v.unverified().count())
            .unwrap_or(0);
        if unverified > 0 && input.options.context.is_none() {
            score -= MISSING_CONTEXT_PENALTY;
            verdict.feedback.push(format!(
                "Meta-critic: {} claim(s) unverifiable and no domain context was supplied",
                unverified
            ));
            verdict.red_flags.push(
                RedFlag::new(
                    Severity::Low,
                    category::VALIDATION,
                    "Claims judged without domain context",
                    "Claims were marked unverifiable without knowing the tool's domain, so some may be false negatives.",
                    "Re-run the audit with --context describing what the tool is expected to do.",
                )
                .with_evidence(format!("{} unverified claim(s), context absent", unverified)),
            );
        }

        let critic_flags = input
            .previous
            .iter()
            .find(|c| c.cycle_name == CycleStage::Critic)
            .map(|c| c.red_flags.as_slice())
            .unwrap_or_default();
        for flag in critic_flags.iter().filter(|f| f.lacks_required_evidence()) {
            score -= INFLATION_PENALTY;
            verdict.feedback.push(format!(
                "Meta-critic: critic raised {} flag '{}' without evidence",
                flag.severity, flag.title
            ));
        }

        if verdict.feedback.is_empty() {
            verdict
                .feedback
                .push("Meta-critic: no bias or missed context detected".to_string());
        }

        verdict.score = normalize_score(score);
        debug!(score = verdict.score, added_flags = verdict.red_flags.len(), "Meta-critic review");
        verdict
    }
}

#[async_trait]
impl ReviewCycle for MetaCritic {
    fn stage(&self) -> CycleStage {
        CycleStage::MetaCritic
    }

    async fn review(&self, input: &CycleInput<'_>) -> Result<CycleVerdict, CycleError> {
        Ok(self.assess(input))
    }
}
