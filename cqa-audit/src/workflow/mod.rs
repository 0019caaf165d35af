//! Audit workflow engine
//!
//! - **Registry**: one analyzer per phase id
//! - **Runner**: executes a phase with a time cap and fault isolation
//! - **Scoring**: weighted, re-normalized phase mean minus a flat flag penalty
//! - **Consensus**: critic → meta-critic → arbiter validation pass
//!
//! The session orchestrator in `services` strings these together.

pub mod consensus;
pub mod registry;
pub mod runner;
pub mod scoring;

pub use consensus::{ConsensusProtocol, ValidationRequest, DEFAULT_CYCLE_TIMEOUT};
pub use registry::PhaseRegistry;
pub use runner::{PhaseOutcome, PhaseRunner, DEFAULT_PHASE_TIMEOUT};
pub use scoring::{score_session, Grade, ScoreBreakdown};
