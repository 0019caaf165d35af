//! Phase Runner
//!
//! Executes a single phase with timing and isolation. Whatever the analyzer
//! does (returns an error, panics, hangs, answers for the wrong phase) the
//! runner hands back a `PhaseResult` and never propagates the failure.

use super::registry::PhaseRegistry;
use crate::models::PhaseResult;
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default wall-clock cap per phase
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(120);

/// What running a phase by string id produced
///
/// An id outside the closed set has no `PhaseId`, so it cannot be carried by
/// a `PhaseResult`; it is still a failed outcome rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Ran(PhaseResult),
    Unrecognized { id: String, error: String },
}

impl PhaseOutcome {
    pub fn success(&self) -> bool {
        matches!(self, PhaseOutcome::Ran(result) if result.success)
    }

    /// Error messages recorded for the outcome
    pub fn errors(&self) -> Vec<String> {
        match self {
            PhaseOutcome::Ran(result) => result.errors.clone(),
            PhaseOutcome::Unrecognized { error, .. } => vec![error.clone()],
        }
    }

    pub fn into_result(self) -> Option<PhaseResult> {
        match self {
            PhaseOutcome::Ran(result) => Some(result),
            PhaseOutcome::Unrecognized { .. } => None,
        }
    }
}

/// Time-bounded, error-isolated phase executor
#[derive(Debug, Clone)]
pub struct PhaseRunner {
    phase_timeout: Duration,
}

impl PhaseRunner {
    pub fn new(phase_timeout: Duration) -> Self {
        Self { phase_timeout }
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    /// Run the analyzer registered for `phase`
    pub async fn run(
        &self,
        registry: &PhaseRegistry,
        phase: PhaseId,
        ctx: &PhaseContext<'_>,
    ) -> PhaseResult {
        match registry.get(phase) {
            Some(analyzer) => self.execute(phase, analyzer, ctx).await,
            None => {
                let error = PhaseError::UnknownPhase(phase.to_string());
                warn!(phase = %phase, "No analyzer registered");
                PhaseResult::failed(phase, error.to_string(), 0)
            }
        }
    }

    /// Run a phase named by string id
    ///
    /// Never fails: an id outside the closed set comes back as
    /// `PhaseOutcome::Unrecognized` carrying the `UnknownPhase` error text, and
    /// a known id with an empty slot as a failed `PhaseResult`.
    pub async fn run_by_name(
        &self,
        registry: &PhaseRegistry,
        id: &str,
        ctx: &PhaseContext<'_>,
    ) -> PhaseOutcome {
        match id.parse::<PhaseId>() {
            Ok(phase) => PhaseOutcome::Ran(self.run(registry, phase, ctx).await),
            Err(e) => {
                warn!(id, error = %e, "Phase id not recognized");
                PhaseOutcome::Unrecognized {
                    id: id.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute(
        &self,
        phase: PhaseId,
        analyzer: &dyn PhaseAnalyzer,
        ctx: &PhaseContext<'_>,
    ) -> PhaseResult {
        info!(
            phase = %phase,
            ordinal = phase.ordinal(),
            target = %ctx.target_path.display(),
            "Phase started"
        );

        let started = Instant::now();
        let guarded = AssertUnwindSafe(analyzer.analyze(ctx)).catch_unwind();
        let outcome = tokio::time::timeout(self.phase_timeout, guarded).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Err(_) => Err(PhaseError::Timeout {
                phase,
                seconds: self.phase_timeout.as_secs(),
            }),
            Ok(Err(panic)) => Err(PhaseError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(output))) if output.findings.phase() != phase => {
                Err(PhaseError::MismatchedFindings {
                    expected: phase,
                    actual: output.findings.phase(),
                })
            }
            Ok(Ok(Ok(output))) if output.findings.score().is_some_and(|s| !s.is_finite()) => {
                Err(PhaseError::InvalidScore { phase })
            }
            Ok(Ok(Ok(output))) => Ok(output),
        };

        match result {
            Ok(output) => {
                debug!(
                    phase = %phase,
                    flags = output.findings.red_flags().len(),
                    warnings = output.warnings.len(),
                    "Phase findings"
                );
                info!(
                    phase = %phase,
                    duration_ms,
                    score = ?output.findings.score(),
                    "Phase completed"
                );
                PhaseResult::succeeded(phase, output.findings, output.warnings, duration_ms)
            }
            Err(e) => {
                warn!(
                    phase = %phase,
                    duration_ms,
                    error = %e,
                    "Phase failed (non-fatal, continuing)"
                );
                PhaseResult::failed(phase, e.to_string(), duration_ms)
            }
        }
    }
}

impl Default for PhaseRunner {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_TIMEOUT)
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AuditOptions, FirstImpressionsFindings, InstallationFindings, PhaseFindings,
    };
    use crate::types::PhaseOutput;
    use std::collections::BTreeMap;
    use std::path::Path;

    struct Fixed(PhaseId, PhaseFindings);

    #[async_trait::async_trait]
    impl PhaseAnalyzer for Fixed {
        fn phase(&self) -> PhaseId {
            self.0
        }

        async fn analyze(&self, _ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
            Ok(PhaseOutput::new(self.1.clone()).with_warnings(vec!["soft".into()]))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl PhaseAnalyzer for Failing {
        fn phase(&self) -> PhaseId {
            PhaseId::Installation
        }

        async fn analyze(&self, _ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
            Err(PhaseError::Command("npm not found".into()))
        }
    }

    struct Panicking;

    #[async_trait::async_trait]
    impl PhaseAnalyzer for Panicking {
        fn phase(&self) -> PhaseId {
            PhaseId::Functionality
        }

        async fn analyze(&self, _ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
            panic!("analyzer exploded");
        }
    }

    struct Hanging;

    #[async_trait::async_trait]
    impl PhaseAnalyzer for Hanging {
        fn phase(&self) -> PhaseId {
            PhaseId::Verification
        }

        async fn analyze(&self, _ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(PhaseError::Internal("unreachable".into()))
        }
    }

    fn first_impressions() -> PhaseFindings {
        PhaseFindings::FirstImpressions(FirstImpressionsFindings {
            score: 9.0,
            ..Default::default()
        })
    }

    async fn run_one(registry: &PhaseRegistry, phase: PhaseId, timeout: Duration) -> PhaseResult {
        let options = AuditOptions::default();
        let prior = BTreeMap::new();
        let ctx = PhaseContext {
            target_path: Path::new("/tmp"),
            options: &options,
            prior: &prior,
            command_timeout: Duration::from_secs(1),
            allow_exec: false,
        };
        PhaseRunner::new(timeout).run(registry, phase, &ctx).await
    }

    #[tokio::test]
    async fn test_success_records_findings_and_warnings() {
        let registry = PhaseRegistry::empty()
            .with(Fixed(PhaseId::FirstImpressions, first_impressions()));
        let result = run_one(&registry, PhaseId::FirstImpressions, Duration::from_secs(5)).await;

        assert!(result.success);
        assert_eq!(result.score(), Some(9.0));
        assert_eq!(result.errors, vec!["soft".to_string()]);
    }

    #[tokio::test]
    async fn test_error_becomes_failed_result() {
        let registry = PhaseRegistry::empty().with(Failing);
        let result = run_one(&registry, PhaseId::Installation, Duration::from_secs(5)).await;

        assert!(!result.success);
        assert!(result.findings.is_none());
        assert!(result.errors[0].contains("npm not found"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let registry = PhaseRegistry::empty().with(Panicking);
        let result = run_one(&registry, PhaseId::Functionality, Duration::from_secs(5)).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("analyzer exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure_not_hang() {
        let registry = PhaseRegistry::empty().with(Hanging);
        let result = run_one(&registry, PhaseId::Verification, Duration::from_secs(2)).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_analyzer_is_unknown_phase() {
        let registry = PhaseRegistry::empty();
        let result = run_one(&registry, PhaseId::RedFlags, Duration::from_secs(5)).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("Unknown phase"));
    }

    #[tokio::test]
    async fn test_mismatched_findings_rejected() {
        let wrong = PhaseFindings::Installation(InstallationFindings::default());
        let registry = PhaseRegistry::empty().with(Fixed(PhaseId::FirstImpressions, wrong));
        let result = run_one(&registry, PhaseId::FirstImpressions, Duration::from_secs(5)).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("returned findings for installation"));
    }

    fn context<'a>(
        options: &'a AuditOptions,
        prior: &'a BTreeMap<PhaseId, PhaseResult>,
    ) -> PhaseContext<'a> {
        PhaseContext {
            target_path: Path::new("/tmp"),
            options,
            prior,
            command_timeout: Duration::from_secs(1),
            allow_exec: false,
        }
    }

    #[tokio::test]
    async fn test_run_by_name_unknown_is_failed_outcome() {
        let registry = PhaseRegistry::reference();
        let options = AuditOptions::default();
        let prior = BTreeMap::new();
        let outcome = PhaseRunner::default()
            .run_by_name(&registry, "lint", &context(&options, &prior))
            .await;

        assert!(!outcome.success());
        assert!(outcome.errors()[0].contains("Unknown phase: lint"));
        assert!(matches!(&outcome, PhaseOutcome::Unrecognized { id, .. } if id == "lint"));
        assert!(outcome.into_result().is_none());
    }

    #[tokio::test]
    async fn test_run_by_name_empty_slot_is_failed_result() {
        let registry = PhaseRegistry::empty();
        let options = AuditOptions::default();
        let prior = BTreeMap::new();
        let outcome = PhaseRunner::default()
            .run_by_name(&registry, "red-flags", &context(&options, &prior))
            .await;

        let result = outcome.into_result().unwrap();
        assert_eq!(result.phase_id, PhaseId::RedFlags);
        assert!(!result.success);
        assert!(result.errors[0].contains("Unknown phase"));
    }

    #[tokio::test]
    async fn test_run_by_name_known_phase_runs() {
        let registry = PhaseRegistry::empty()
            .with(Fixed(PhaseId::FirstImpressions, first_impressions()));
        let options = AuditOptions::default();
        let prior = BTreeMap::new();
        let outcome = PhaseRunner::default()
            .run_by_name(&registry, "first-impressions", &context(&options, &prior))
            .await;

        assert!(outcome.success());
        assert_eq!(outcome.into_result().and_then(|r| r.score()), Some(9.0));
    }

    #[tokio::test]
    async fn test_non_finite_score_rejected() {
        for score in [f64::NAN, f64::INFINITY] {
            let findings = PhaseFindings::FirstImpressions(FirstImpressionsFindings {
                score,
                ..Default::default()
            });
            let registry = PhaseRegistry::empty().with(Fixed(PhaseId::FirstImpressions, findings));
            let result =
                run_one(&registry, PhaseId::FirstImpressions, Duration::from_secs(5)).await;

            assert!(!result.success);
            assert!(result.findings.is_none());
            assert!(result.errors[0].contains("non-finite score"));
        }
    }
}
