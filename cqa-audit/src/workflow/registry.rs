//! Phase registry
//!
//! Maps each `PhaseId` to the analyzer that implements it. The set of ids is
//! closed (an enum), so the only runtime miss is a slot nobody filled, or a
//! string id that does not name a phase.

use crate::analyzers::{
    ErrorHandlingAnalyzer, FirstImpressionsAnalyzer, FunctionalityAnalyzer,
    InstallationAnalyzer, RedFlagsAnalyzer, VerificationAnalyzer,
};
use crate::types::{PhaseAnalyzer, PhaseError, PhaseId};
use std::collections::BTreeMap;

/// Analyzer per phase
#[derive(Default)]
pub struct PhaseRegistry {
    analyzers: BTreeMap<PhaseId, Box<dyn PhaseAnalyzer>>,
}

impl PhaseRegistry {
    /// Registry with no analyzers; every phase fails with `UnknownPhase`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry wired with the bundled heuristic analyzers
    pub fn reference() -> Self {
        Self::empty()
            .with(FirstImpressionsAnalyzer::new())
            .with(InstallationAnalyzer::new())
            .with(FunctionalityAnalyzer::new())
            .with(VerificationAnalyzer::new())
            .with(ErrorHandlingAnalyzer::new())
            .with(RedFlagsAnalyzer::new())
    }

    /// Install an analyzer in its phase slot, returning the one it replaced
    pub fn register(&mut self, analyzer: Box<dyn PhaseAnalyzer>) -> Option<Box<dyn PhaseAnalyzer>> {
        self.analyzers.insert(analyzer.phase(), analyzer)
    }

    /// Builder form of `register`
    pub fn with(mut self, analyzer: impl PhaseAnalyzer + 'static) -> Self {
        self.register(Box::new(analyzer));
        self
    }

    pub fn get(&self, phase: PhaseId) -> Option<&dyn PhaseAnalyzer> {
        self.analyzers.get(&phase).map(|a| a.as_ref())
    }

    /// Resolve a phase by id string
    pub fn resolve(&self, id: &str) -> Result<(PhaseId, &dyn PhaseAnalyzer), PhaseError> {
        let phase: PhaseId = id.parse()?;
        self.get(phase)
            .map(|analyzer| (phase, analyzer))
            .ok_or_else(|| PhaseError::UnknownPhase(id.to_string()))
    }

    pub fn contains(&self, phase: PhaseId) -> bool {
        self.analyzers.contains_key(&phase)
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}
