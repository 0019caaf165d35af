//! Audit session orchestration
//!
//! Runs one audit end to end against one target directory:
//! 1. Precheck the target (the only fatal failure)
//! 2. Run the six phases strictly in order, each seeing the ones before it
//! 3. Merge the phases' flags into one ordered list
//! 4. Score with the scoring engine
//! 5. Optionally run the consensus protocol, whose score replaces the engine's
//! 6. Mark the session complete
//!
//! Cancellation stops new phases and cycles from starting. Whatever finished
//! is kept, and the session is returned complete but truncated.

use crate::error::{AuditError, AuditResult};
use crate::models::{dedupe_flags, AuditOptions, AuditSession, RedFlag};
use crate::types::{PhaseContext, PhaseId};
use crate::workflow::consensus::{ConsensusProtocol, ValidationRequest, DEFAULT_CYCLE_TIMEOUT};
use crate::workflow::registry::PhaseRegistry;
use crate::workflow::runner::{PhaseRunner, DEFAULT_PHASE_TIMEOUT};
use crate::workflow::scoring::score_session;
use cqa_common::config::AuditSection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default cap for one external command spawned by an analyzer
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution limits for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub phase_timeout: Duration,
    pub command_timeout: Duration,
    pub cycle_timeout: Duration,
    /// Analyzers may spawn build and probe commands in the target
    pub allow_exec: bool,
}

impl OrchestratorSettings {
    /// Settings from the `[audit]` section of the bootstrap config
    pub fn from_config(audit: &AuditSection) -> Self {
        Self {
            phase_timeout: Duration::from_secs(audit.phase_timeout_secs),
            command_timeout: Duration::from_secs(audit.command_timeout_secs),
            cycle_timeout: Duration::from_secs(audit.cycle_timeout_secs),
            allow_exec: audit.allow_exec,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            allow_exec: false,
        }
    }
}

/// Session-level audit orchestrator
///
/// Holds no per-session state, so one orchestrator can run many sessions
/// concurrently.
pub struct SessionOrchestrator {
    registry: PhaseRegistry,
    runner: PhaseRunner,
    protocol: ConsensusProtocol,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    /// Create orchestrator
    ///
    /// The protocol's cycle timeout is taken from `settings`.
    pub fn new(registry: PhaseRegistry, protocol: ConsensusProtocol, settings: OrchestratorSettings) -> Self {
        Self {
            registry,
            runner: PhaseRunner::new(settings.phase_timeout),
            protocol: protocol.with_cycle_timeout(settings.cycle_timeout),
            settings,
        }
    }

    /// Orchestrator with the bundled analyzers and review cycles
    pub fn reference(settings: OrchestratorSettings) -> Self {
        Self::new(PhaseRegistry::reference(), ConsensusProtocol::reference(), settings)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run a complete audit
    ///
    /// # Errors
    /// `TargetNotFound`, `TargetNotADirectory` or `TargetInaccessible` when the
    /// target cannot be audited. No session is produced in that case. Every
    /// other failure is recorded inside the returned session.
    pub async fn run(
        &self,
        target: &Path,
        options: AuditOptions,
        cancel: CancellationToken,
    ) -> AuditResult<AuditSession> {
        let target_path = precheck_target(target)?;
        let mut session = AuditSession::new(target_path, options);

        info!(
            session_id = %session.session_id,
            target = %session.target_path.display(),
            tier = %session.options.tier,
            validation = session.options.validation_enabled,
            "Audit started"
        );

        for phase in PhaseId::ALL {
            if cancel.is_cancelled() {
                info!(
                    session_id = %session.session_id,
                    next_phase = %phase,
                    completed = session.phase_findings.len(),
                    "Audit cancelled before phase"
                );
                session.truncated = true;
                break;
            }

            let result = {
                let ctx = PhaseContext {
                    target_path: &session.target_path,
                    options: &session.options,
                    prior: &session.phase_findings,
                    command_timeout: self.settings.command_timeout,
                    allow_exec: self.settings.allow_exec,
                };
                self.runner.run(&self.registry, phase, &ctx).await
            };
            session.record_phase(result);
        }

        session.red_flags = merge_phase_flags(&session);

        let breakdown = score_session(&session.phase_findings, session.red_flags.len());
        session.pre_validation_score = Some(breakdown.final_score);
        session.score = Some(breakdown.final_score);
        info!(
            session_id = %session.session_id,
            score = breakdown.final_score,
            base_score = breakdown.base_score,
            penalty = breakdown.penalty,
            phases_scored = breakdown.phases_scored(),
            red_flags = session.red_flags.len(),
            "Session scored"
        );
        debug!(report = %breakdown.report(), "Scoring report");

        if session.options.validation_enabled {
            if session.truncated {
                info!(session_id = %session.session_id, "Validation skipped for truncated session");
            } else {
                self.validate(&mut session, breakdown.final_score, &cancel).await;
            }
        }

        session.complete();
        info!(
            session_id = %session.session_id,
            score = ?session.score,
            grade = ?session.grade().map(|g| g.to_string()),
            truncated = session.truncated,
            elapsed_ms = ?session.elapsed_ms(),
            "Audit completed"
        );

        Ok(session)
    }

    async fn validate(&self, session: &mut AuditSession, pre_validation_score: f64, cancel: &CancellationToken) {
        let result = {
            let request = ValidationRequest {
                target_path: &session.target_path,
                options: &session.options,
                phases: &session.phase_findings,
                flags: &session.red_flags,
                pre_validation_score,
            };
            self.protocol.run(request, cancel).await
        };

        if result.truncated {
            // arbiter never ran; keep the engine's score
            session.truncated = true;
        } else {
            session.score = Some(result.score);
        }
        session.red_flags.extend(result.additional_flags.iter().cloned());

        info!(
            session_id = %session.session_id,
            score = result.score,
            passed = result.passed,
            added_flags = result.additional_flags.len(),
            truncated = result.truncated,
            "Validation completed"
        );
        session.validation = Some(result);
    }
}

/// Canonical path of an auditable target directory
pub fn precheck_target(target: &Path) -> AuditResult<PathBuf> {
    let metadata = match std::fs::metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuditError::TargetNotFound(target.to_path_buf()));
        }
        Err(e) => {
            return Err(AuditError::TargetInaccessible {
                path: target.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    if !metadata.is_dir() {
        return Err(AuditError::TargetNotADirectory(target.to_path_buf()));
    }

    std::fs::read_dir(target).map_err(|e| AuditError::TargetInaccessible {
        path: target.to_path_buf(),
        reason: e.to_string(),
    })?;

    std::fs::canonicalize(target).map_err(|e| AuditError::TargetInaccessible {
        path: target.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Every phase's own flags in execution order, minus unreportable and repeated ones
fn merge_phase_flags(session: &AuditSession) -> Vec<RedFlag> {
    let mut merged = Vec::new();
    for (phase, result) in &session.phase_findings {
        let Some(findings) = &result.findings else {
            continue;
        };
        for flag in findings.red_flags() {
            if !flag.is_reportable() {
                warn!(phase = %phase, title = %flag.title, "Dropping flag without title or fix");
                continue;
            }
            if flag.lacks_required_evidence() {
                debug!(phase = %phase, title = %flag.title, severity = %flag.severity, "Flag without evidence");
            }
            merged.push(flag.clone());
        }
    }
    dedupe_flags(merged)
}
