//! Audit data model
//!
//! Session aggregate, phase results, per-phase findings, red flags and
//! validation outcomes. Everything here is serializable; the persisted session
//! format is exactly these types.

pub mod audit_session;
pub mod findings;
pub mod options;
pub mod phase_result;
pub mod red_flag;
pub mod validation;

pub use audit_session::AuditSession;
pub use findings::{
    ClaimCheck, ClaimSource, CommandExecution, ErrorHandlingFindings, FirstImpressionsFindings,
    FunctionalityFindings, InstallMethod, InstallationFindings, PhaseFindings,
    RedFlagScanFindings, VerificationFindings,
};
pub use options::{AuditOptions, Tier};
pub use phase_result::PhaseResult;
pub use red_flag::{category, dedupe_flags, RedFlag, Severity, SeverityCounts};
pub use validation::{CycleResult, ValidationResult, NEUTRAL_CYCLE_SCORE, PASS_THRESHOLD};
