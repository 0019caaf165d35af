//! Services for cqa-audit

pub mod quota;
pub mod session_orchestrator;
pub mod session_store;

pub use quota::{ensure_allowed, QuotaError, QuotaGate, UsageLedger};
pub use session_orchestrator::{OrchestratorSettings, SessionOrchestrator};
