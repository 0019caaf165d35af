//! Session Orchestrator Tests
//! Test File: orchestrator_tests.rs
//! Covers: phase ordering, scoring, validation override, cancellation, preconditions

mod helpers;

use cqa_audit::models::{category, RedFlag, Severity};
use cqa_audit::types::{CycleStage, PhaseId};
use cqa_audit::workflow::consensus::ConsensusProtocol;
use cqa_audit::workflow::registry::PhaseRegistry;
use cqa_audit::{AuditError, AuditOptions, Tier};
use helpers::*;
use tokio_util::sync::CancellationToken;

/// TC-ORC-001: Weighted score with flat flag penalty, validation disabled
#[tokio::test]
async fn tc_orc_001_weighted_score_with_flag_penalty() {
    // Given: Scorable phases score 8, 6, 9, 7 and three flags exist
    let project = empty_project();
    let flags = vec![
        flag(Severity::Low, "one"),
        flag(Severity::Medium, "two"),
        flag(Severity::High, "three"),
    ];
    let orchestrator = orchestrator(
        fixed_registry([Some(8.0), Some(6.0), Some(9.0), Some(7.0)], flags),
        fixed_protocol(1.0, 1.0, 1.0),
    );

    // When: Audit runs on the free tier
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Free), CancellationToken::new())
        .await
        .unwrap();

    // Then: 6.9 / 0.9 = 7.67 base, 0.3 penalty, 7.4 final
    assert_eq!(session.red_flags.len(), 3);
    assert_eq!(session.score, Some(7.4));
    assert_eq!(session.pre_validation_score, Some(7.4));
    assert!(session.validation.is_none());
    assert!(session.is_complete());
}

/// TC-ORC-002: Every phase errors
#[tokio::test]
async fn tc_orc_002_all_phases_fail_scores_zero() {
    // Given: Each phase's analyzer fails
    let project = empty_project();
    let mut registry = PhaseRegistry::empty();
    for phase in PhaseId::ALL {
        registry.register(Box::new(FailingPhase(phase)));
    }
    let orchestrator = orchestrator(registry, fixed_protocol(9.0, 9.0, 9.0));

    // When: Audit runs
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Free), CancellationToken::new())
        .await
        .unwrap();

    // Then: Every phase is recorded as failed, score is 0 and the session completes
    assert_eq!(session.phase_findings.len(), 6);
    assert!(session.phase_findings.values().all(|r| !r.success));
    assert!(session.phase_findings.values().all(|r| !r.errors.is_empty()));
    assert_eq!(session.score, Some(0.0));
    assert!(session.completed_at.is_some());
}

/// TC-ORC-003: Arbiter score replaces the engine's score
#[tokio::test]
async fn tc_orc_003_validation_overrides_score() {
    // Given: Phases produce a 4.0 session and the arbiter will say 7.5
    let project = empty_project();
    let orchestrator = orchestrator(
        fixed_registry([Some(4.0); 4], Vec::new()),
        fixed_protocol(3.0, 2.0, 7.5),
    );

    // When: Audit runs on a tier with validation
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Pro), CancellationToken::new())
        .await
        .unwrap();

    // Then: Final score is the arbiter's, not an average
    assert_eq!(session.pre_validation_score, Some(4.0));
    assert_eq!(session.score, Some(7.5));
    let validation = session.validation.as_ref().unwrap();
    assert!(validation.passed);
    assert!(!validation.truncated);
    let stages: Vec<CycleStage> = validation.cycles.iter().map(|c| c.cycle_name).collect();
    assert_eq!(stages, CycleStage::ALL.to_vec());
}

/// TC-ORC-004: Missing target is the only fatal error
#[tokio::test]
async fn tc_orc_004_missing_target_is_fatal() {
    // Given: A path that does not exist
    let project = empty_project();
    let missing = project.path().join("no-such-project");
    let orchestrator = orchestrator(fixed_registry([Some(5.0); 4], Vec::new()), fixed_protocol(5.0, 5.0, 5.0));

    // When: Audit is requested
    let result = orchestrator
        .run(&missing, AuditOptions::default(), CancellationToken::new())
        .await;

    // Then: No session, TargetNotFound
    match result {
        Err(AuditError::TargetNotFound(path)) => assert_eq!(path, missing),
        other => panic!("expected TargetNotFound, got {:?}", other.map(|s| s.session_id)),
    }
}

/// TC-ORC-005: Missing phase scores re-normalize the weights
#[tokio::test]
async fn tc_orc_005_failed_phase_excluded_from_weights() {
    // Given: Functionality fails, the other scorable phases score 8, 6, 7
    let project = empty_project();
    let registry = fixed_registry([Some(8.0), Some(6.0), None, Some(7.0)], Vec::new())
        .with(FailingPhase(PhaseId::Functionality));
    let orchestrator = orchestrator(registry, fixed_protocol(5.0, 5.0, 5.0));

    // When: Audit runs
    let session = orchestrator
        .run(project.path(), AuditOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    // Then: (1.2 + 1.5 + 1.05) / 0.55 = 6.8
    assert!(!session.phase(PhaseId::Functionality).unwrap().success);
    assert_eq!(session.score, Some(6.8));
}

/// TC-ORC-006: Unregistered phase is recorded, not fatal
#[tokio::test]
async fn tc_orc_006_empty_slot_recorded_as_failure() {
    // Given: No verification analyzer
    let project = empty_project();
    let registry = PhaseRegistry::empty()
        .with(FixedPhase::new(PhaseId::FirstImpressions, Some(6.0)))
        .with(FixedPhase::new(PhaseId::Installation, Some(6.0)))
        .with(FixedPhase::new(PhaseId::Functionality, Some(6.0)))
        .with(FixedPhase::new(PhaseId::ErrorHandling, None))
        .with(FixedPhase::new(PhaseId::RedFlags, None));
    let orchestrator = orchestrator(registry, fixed_protocol(5.0, 5.0, 5.0));

    // When: Audit runs
    let session = orchestrator
        .run(project.path(), AuditOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    // Then: Verification failed with an unknown-phase error, later phases still ran
    let verification = session.phase(PhaseId::Verification).unwrap();
    assert!(!verification.success);
    assert!(verification.errors[0].contains("Unknown phase"));
    assert!(session.phase(PhaseId::RedFlags).unwrap().success);
    assert_eq!(session.score, Some(6.0));
}

/// TC-ORC-007: Cancellation mid-pipeline keeps finished phases
#[tokio::test]
async fn tc_orc_007_cancellation_truncates_session() {
    // Given: The installation analyzer cancels the session while running
    let project = empty_project();
    let cancel = CancellationToken::new();
    let registry = fixed_registry([Some(8.0), None, Some(9.0), Some(9.0)], Vec::new()).with(CancellingPhase {
        phase: PhaseId::Installation,
        score: 7.0,
        cancel: cancel.clone(),
    });
    let orchestrator = orchestrator(registry, fixed_protocol(9.0, 9.0, 9.0));

    // When: Audit runs on a validation tier
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Pro), cancel)
        .await
        .unwrap();

    // Then: Two phases recorded, no validation, partial score, session complete
    let recorded: Vec<PhaseId> = session.phase_findings.keys().copied().collect();
    assert_eq!(recorded, vec![PhaseId::FirstImpressions, PhaseId::Installation]);
    assert!(session.truncated);
    assert!(session.validation.is_none());
    // (1.2 + 1.75) / 0.4
    assert_eq!(session.score, Some(7.4));
    assert!(session.completed_at.is_some());
}

/// TC-ORC-008: Cancellation during validation keeps the engine's score
#[tokio::test]
async fn tc_orc_008_cancellation_during_validation() {
    // Given: The critic cancels the session
    let project = empty_project();
    let cancel = CancellationToken::new();
    let protocol = ConsensusProtocol::new(
        Box::new(CancellingCycle {
            stage: CycleStage::Critic,
            cancel: cancel.clone(),
        }),
        Box::new(FixedCycle::new(CycleStage::MetaCritic, 9.0)),
        Box::new(FixedCycle::new(CycleStage::Arbiter, 9.0)),
    );
    let orchestrator = orchestrator(fixed_registry([Some(5.0); 4], Vec::new()), protocol);

    // When: Audit runs
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Enterprise), cancel)
        .await
        .unwrap();

    // Then: Only the critic ran; the arbiter never overrode the score
    let validation = session.validation.as_ref().unwrap();
    assert!(validation.truncated);
    assert_eq!(validation.cycles.len(), 1);
    assert!(session.truncated);
    assert_eq!(session.score, Some(5.0));
    assert!(session.is_complete());
}

/// TC-ORC-009: Flags merge in phase order, deduplicated, validation flags last
#[tokio::test]
async fn tc_orc_009_flag_merge_order() {
    // Given: Two phases report the same flag, one phase reports an unusable flag,
    // and the critic adds a flag of its own
    let project = empty_project();
    let shared = flag(Severity::High, "Crashes on empty input");
    let unusable = RedFlag::new(Severity::Low, category::TESTING, "Something", "desc", " ");
    let registry = PhaseRegistry::empty()
        .with(FixedPhase::new(PhaseId::FirstImpressions, Some(7.0)).with_flags(vec![flag(Severity::Low, "first")]))
        .with(FixedPhase::new(PhaseId::Installation, Some(7.0)))
        .with(FixedPhase::new(PhaseId::Functionality, Some(7.0)).with_flags(vec![shared.clone()]))
        .with(FixedPhase::new(PhaseId::Verification, Some(7.0)).with_flags(vec![unusable]))
        .with(FixedPhase::new(PhaseId::ErrorHandling, None).with_flags(vec![shared]))
        .with(FixedPhase::new(PhaseId::RedFlags, None));
    let protocol = ConsensusProtocol::new(
        Box::new(FixedCycle::new(CycleStage::Critic, 7.0).with_flags(vec![flag(Severity::Medium, "critic")])),
        Box::new(FixedCycle::new(CycleStage::MetaCritic, 7.0)),
        Box::new(FixedCycle::new(CycleStage::Arbiter, 7.0)),
    );
    let orchestrator = orchestrator(registry, protocol);

    // When: Audit runs with validation
    let session = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Pro), CancellationToken::new())
        .await
        .unwrap();

    // Then: Phase flags first (deduped, unusable dropped), then validation flags
    let titles: Vec<&str> = session.red_flags.iter().map(|f| f.title.as_str()).collect();
    assert_eq!(titles, vec!["first", "Crashes on empty input", "critic"]);
    // Penalty counted on the two phase flags only
    assert_eq!(session.pre_validation_score, Some(6.8));
    assert_eq!(session.score, Some(7.0));
}

/// TC-ORC-010: Validation disabled by the caller on a validation tier
#[tokio::test]
async fn tc_orc_010_validation_opt_out() {
    // Given: Enterprise tier with validation switched off
    let project = empty_project();
    let orchestrator = orchestrator(fixed_registry([Some(9.0); 4], Vec::new()), fixed_protocol(1.0, 1.0, 1.0));
    let options = AuditOptions::for_tier(Tier::Enterprise).with_validation(false);

    // When: Audit runs
    let session = orchestrator
        .run(project.path(), options, CancellationToken::new())
        .await
        .unwrap();

    // Then: Engine score stands
    assert!(session.validation.is_none());
    assert_eq!(session.score, Some(9.0));
}

/// TC-ORC-011: Same inputs, same outcome
#[tokio::test]
async fn tc_orc_011_repeat_runs_are_deterministic() {
    // Given: One orchestrator and one target
    let project = empty_project();
    let flags = vec![flag(Severity::High, "a"), flag(Severity::Low, "b")];
    let orchestrator = orchestrator(
        fixed_registry([Some(6.5), Some(7.5), Some(8.0), None], flags),
        fixed_protocol(6.0, 6.5, 7.0),
    );

    // When: The target is audited twice
    let first = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Pro), CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .run(project.path(), AuditOptions::for_tier(Tier::Pro), CancellationToken::new())
        .await
        .unwrap();

    // Then: Scores, flags and phase order agree; sessions are distinct
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(first.score, second.score);
    assert_eq!(first.pre_validation_score, second.pre_validation_score);
    assert_eq!(first.red_flags, second.red_flags);
    assert_eq!(
        first.phase_findings.keys().collect::<Vec<_>>(),
        second.phase_findings.keys().collect::<Vec<_>>()
    );
}

/// TC-ORC-012: Concurrent sessions on one orchestrator
#[tokio::test]
async fn tc_orc_012_concurrent_sessions_isolated() {
    // Given: Two targets and one shared orchestrator
    let a = empty_project();
    let b = empty_project();
    let orchestrator = orchestrator(fixed_registry([Some(8.0); 4], Vec::new()), fixed_protocol(8.0, 8.0, 8.0));

    // When: Both audits run at once
    let (first, second) = tokio::join!(
        orchestrator.run(a.path(), AuditOptions::for_tier(Tier::Free), CancellationToken::new()),
        orchestrator.run(b.path(), AuditOptions::for_tier(Tier::Free), CancellationToken::new()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Then: Each session describes its own target
    assert_ne!(first.target_path, second.target_path);
    assert_eq!(first.phase_findings.len(), 6);
    assert_eq!(second.phase_findings.len(), 6);
    assert_eq!(first.score, Some(8.0));
    assert_eq!(second.score, Some(8.0));
}
