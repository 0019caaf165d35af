//! Core Types and Trait Definitions for CQA
//!
//! Defines the two plugin seams of the audit engine:
//! - **Phase analyzers:** `PhaseAnalyzer` (6 phases, run in fixed order)
//! - **Review cycles:** `ReviewCycle` (critic → meta-critic → arbiter)
//!
//! Both seams are agnostic to what backs an implementation: static heuristics,
//! external command execution or a remote reasoning service all fit behind the
//! same contract. The engine only relies on the shapes defined here.

use crate::models::{AuditOptions, PhaseFindings, PhaseResult, RedFlag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Phase identifiers
// ============================================================================

/// Closed set of pipeline phases
///
/// Declaration order is execution order, and `Ord` follows it, so a
/// `BTreeMap<PhaseId, _>` iterates phases in the order they ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseId {
    FirstImpressions,
    Installation,
    Functionality,
    Verification,
    ErrorHandling,
    RedFlags,
}

impl PhaseId {
    /// All phases in execution order
    pub const ALL: [PhaseId; 6] = [
        PhaseId::FirstImpressions,
        PhaseId::Installation,
        PhaseId::Functionality,
        PhaseId::Verification,
        PhaseId::ErrorHandling,
        PhaseId::RedFlags,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseId::FirstImpressions => "first-impressions",
            PhaseId::Installation => "installation",
            PhaseId::Functionality => "functionality",
            PhaseId::Verification => "verification",
            PhaseId::ErrorHandling => "error-handling",
            PhaseId::RedFlags => "red-flags",
        }
    }

    /// Weight in the session score, `None` for phases that only emit flags
    pub fn weight(self) -> Option<f64> {
        match self {
            PhaseId::FirstImpressions => Some(0.15),
            PhaseId::Installation => Some(0.25),
            PhaseId::Functionality => Some(0.35),
            PhaseId::Verification => Some(0.15),
            PhaseId::ErrorHandling | PhaseId::RedFlags => None,
        }
    }

    pub fn is_scorable(self) -> bool {
        self.weight().is_some()
    }

    /// 1-based position in the pipeline
    pub fn ordinal(self) -> usize {
        match self {
            PhaseId::FirstImpressions => 1,
            PhaseId::Installation => 2,
            PhaseId::Functionality => 3,
            PhaseId::Verification => 4,
            PhaseId::ErrorHandling => 5,
            PhaseId::RedFlags => 6,
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseId::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| PhaseError::UnknownPhase(s.to_string()))
    }
}

// ============================================================================
// Phase contract
// ============================================================================

/// Execution context handed to every analyzer
///
/// `prior` is a read-only view of every phase that already ran in this
/// session, keyed in execution order.
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    /// Absolute path of the project under audit
    pub target_path: &'a Path,
    /// Caller options (domain context, tier, verbosity)
    pub options: &'a AuditOptions,
    /// Results of all earlier phases
    pub prior: &'a BTreeMap<PhaseId, PhaseResult>,
    /// Cap for any single external command an analyzer spawns
    pub command_timeout: Duration,
    /// Whether analyzers may spawn build/probe commands in the target
    pub allow_exec: bool,
}

impl<'a> PhaseContext<'a> {
    /// Findings of an earlier phase, if it ran and succeeded
    pub fn prior_findings(&self, phase: PhaseId) -> Option<&'a PhaseFindings> {
        self.prior.get(&phase).and_then(|result| result.findings.as_ref())
    }

    /// Domain context string supplied by the caller
    pub fn domain_context(&self) -> Option<&'a str> {
        self.options.context.as_deref()
    }

    /// All flags discovered by earlier phases, in discovery order
    pub fn prior_flags(&self) -> Vec<&'a RedFlag> {
        self.prior
            .values()
            .filter_map(|result| result.findings.as_ref())
            .flat_map(|findings| findings.red_flags().iter())
            .collect()
    }
}

/// Analyzer output: findings plus soft issues that did not stop the phase
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub findings: PhaseFindings,
    /// Recorded in `PhaseResult::errors` even though the phase succeeded
    pub warnings: Vec<String>,
}

impl PhaseOutput {
    pub fn new(findings: PhaseFindings) -> Self {
        Self {
            findings,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Phase analyzer trait
///
/// One implementation per pipeline phase. Implementations may probe the
/// filesystem read-only and spawn bounded external processes. Errors and
/// panics never cross the runner boundary; they are recorded on the
/// phase's `PhaseResult`.
///
/// # Example
/// ```rust,ignore
/// use cqa_audit::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
///
/// pub struct ReadmeOnly;
///
/// #[async_trait::async_trait]
/// impl PhaseAnalyzer for ReadmeOnly {
///     fn phase(&self) -> PhaseId { PhaseId::FirstImpressions }
///
///     async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
///         let findings = inspect_readme(ctx.target_path)?;
///         Ok(PhaseOutput::new(findings))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait PhaseAnalyzer: Send + Sync {
    /// Phase this analyzer implements
    fn phase(&self) -> PhaseId;

    /// Analyze the target project
    ///
    /// # Errors
    /// Returns `PhaseError` when the analysis itself fails. A failing target
    /// project is not an error; it is reported through findings and flags.
    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError>;
}

/// Phase execution error
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Phase id not in the closed set, or no analyzer registered for it
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    /// Phase exceeded its wall-clock cap
    #[error("Phase {phase} timed out after {seconds}s")]
    Timeout { phase: PhaseId, seconds: u64 },

    /// Analyzer panicked
    #[error("Analyzer panicked: {0}")]
    Panicked(String),

    /// I/O error while probing the target
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// External command could not be spawned
    #[error("Command error: {0}")]
    Command(String),

    /// Analyzer returned findings for another phase
    #[error("Analyzer for {expected} returned findings for {actual}")]
    MismatchedFindings { expected: PhaseId, actual: PhaseId },

    /// Analyzer reported a NaN or infinite score
    #[error("Analyzer for {phase} returned a non-finite score")]
    InvalidScore { phase: PhaseId },

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Review cycle contract
// ============================================================================

/// Validation stages, in the only order they ever run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStage {
    Critic,
    MetaCritic,
    Arbiter,
}

impl CycleStage {
    pub const ALL: [CycleStage; 3] = [
        CycleStage::Critic,
        CycleStage::MetaCritic,
        CycleStage::Arbiter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CycleStage::Critic => "critic",
            CycleStage::MetaCritic => "meta-critic",
            CycleStage::Arbiter => "arbiter",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input handed to each review cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    pub target_path: &'a Path,
    pub options: &'a AuditOptions,
    /// Every phase result of the session
    pub phases: &'a BTreeMap<PhaseId, PhaseResult>,
    /// Session flags followed by flags added by earlier cycles
    pub flags: &'a [RedFlag],
    /// Results of the cycles that already ran
    pub previous: &'a [crate::models::CycleResult],
    /// Scoring-engine score before validation
    pub pre_validation_score: f64,
}

/// What a single cycle concluded
#[derive(Debug, Clone, Default)]
pub struct CycleVerdict {
    /// 0–10; clamped by the protocol
    pub score: f64,
    pub feedback: Vec<String>,
    /// Flags introduced by this cycle alone
    pub red_flags: Vec<RedFlag>,
}

/// Review cycle trait
///
/// # Example
/// ```rust,ignore
/// pub struct LenientCritic;
///
/// #[async_trait::async_trait]
/// impl ReviewCycle for LenientCritic {
///     fn stage(&self) -> CycleStage { CycleStage::Critic }
///
///     async fn review(&self, input: &CycleInput<'_>) -> Result<CycleVerdict, CycleError> {
///         Ok(CycleVerdict { score: 9.0, feedback: vec!["looks fine".into()], red_flags: vec![] })
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ReviewCycle: Send + Sync {
    fn stage(&self) -> CycleStage;

    async fn review(&self, input: &CycleInput<'_>) -> Result<CycleVerdict, CycleError>;
}

/// Review cycle error
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: CycleStage, seconds: u64 },

    #[error("{stage} panicked: {message}")]
    Panicked { stage: CycleStage, message: String },

    /// Backing service unavailable or returned garbage
    #[error("Review unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_execution_order() {
        let mut shuffled = vec![
            PhaseId::RedFlags,
            PhaseId::Installation,
            PhaseId::ErrorHandling,
            PhaseId::FirstImpressions,
            PhaseId::Verification,
            PhaseId::Functionality,
        ];
        shuffled.sort();
        assert_eq!(shuffled, PhaseId::ALL.to_vec());

        for (index, phase) in PhaseId::ALL.iter().enumerate() {
            assert_eq!(phase.ordinal(), index + 1);
        }
    }

    #[test]
    fn test_phase_id_round_trips_through_str() {
        for phase in PhaseId::ALL {
            assert_eq!(phase.as_str().parse::<PhaseId>().unwrap(), phase);
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
        }
    }

    #[test]
    fn test_unknown_phase_id() {
        let err = "performance".parse::<PhaseId>().unwrap_err();
        assert!(matches!(err, PhaseError::UnknownPhase(ref id) if id == "performance"));
    }

    #[test]
    fn test_scorable_weights() {
        let total: f64 = PhaseId::ALL.iter().filter_map(|p| p.weight()).sum();
        assert!((total - 0.90).abs() < 1e-9);
        assert!(!PhaseId::ErrorHandling.is_scorable());
        assert!(!PhaseId::RedFlags.is_scorable());
        assert!(PhaseId::Functionality.is_scorable());
    }

    #[test]
    fn test_cycle_stage_order() {
        assert_eq!(
            CycleStage::ALL,
            [CycleStage::Critic, CycleStage::MetaCritic, CycleStage::Arbiter]
        );
        assert_eq!(serde_json::to_string(&CycleStage::MetaCritic).unwrap(), "\"meta-critic\"");
    }
}
