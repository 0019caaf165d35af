//! Reference review cycles for the consensus protocol
//!
//! Deterministic rule-based implementations of the three `ReviewCycle` stages.
//! A remote reviewer can replace any of them without touching the protocol.

pub mod arbiter;
pub mod critic;
pub mod meta_critic;

pub use arbiter::EvidenceArbiter;
pub use critic::Critic;
pub use meta_critic::MetaCritic;
