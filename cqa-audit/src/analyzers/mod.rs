//! Reference phase analyzers
//!
//! One deterministic heuristic analyzer per pipeline phase. Any of them can be
//! swapped out through `PhaseRegistry::register`.

pub mod error_handling;
pub mod first_impressions;
pub mod functionality;
pub mod installation;
pub mod probe;
pub mod red_flags;
pub mod verification;

pub use error_handling::ErrorHandlingAnalyzer;
pub use first_impressions::FirstImpressionsAnalyzer;
pub use functionality::FunctionalityAnalyzer;
pub use installation::InstallationAnalyzer;
pub use red_flags::RedFlagsAnalyzer;
pub use verification::VerificationAnalyzer;
