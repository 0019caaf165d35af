//! cqa-audit library interface
//!
//! Audit orchestration engine for command-line projects: six analysis phases,
//! a scoring engine, a red-flag model and a three-cycle validation protocol.

pub mod analyzers;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod validators;
pub mod workflow;

pub use crate::error::{AuditError, AuditResult};
pub use crate::models::{AuditOptions, AuditSession, RedFlag, Severity, Tier};
pub use crate::services::{OrchestratorSettings, SessionOrchestrator};
pub use crate::types::{PhaseAnalyzer, PhaseId, ReviewCycle};
