//! Red flag model
//!
//! Shared defect vocabulary. Every phase analyzer and every review cycle emits
//! into this shape, so flags from different sources can be merged, counted and
//! scored side by side.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Defect severity, totally ordered `Critical > High > Medium > Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most severe first
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    fn rank(self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::High => 2,
            Severity::Medium => 1,
            Severity::Low => 0,
        }
    }

    /// Penalty weight used by the evidence arbiter
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.5,
            Severity::Medium => 0.25,
            Severity::Low => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common categories. `category` stays free text; these are the ones the
/// bundled analyzers emit.
pub mod category {
    pub const DOCUMENTATION: &str = "documentation";
    pub const INSTALLATION: &str = "installation";
    pub const FUNCTIONALITY: &str = "functionality";
    pub const DATA_ACCURACY: &str = "data-accuracy";
    pub const ERROR_HANDLING: &str = "error-handling";
    pub const SECURITY: &str = "security";
    pub const TESTING: &str = "testing";
    pub const VALIDATION: &str = "validation";
}

/// One discrete defect found in the target project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub description: String,
    /// File snippets, command output or log lines backing the claim
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Suggested remediation
    pub fix: String,
    /// File path or command inside the target project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RedFlag {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            title: title.into(),
            description: description.into(),
            evidence: Vec::new(),
            fix: fix.into(),
            location: None,
        }
    }

    pub fn with_evidence(mut self, item: impl Into<String>) -> Self {
        self.evidence.push(item.into());
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// A flag may reach a finished session only with a title and a fix
    pub fn is_reportable(&self) -> bool {
        !self.title.trim().is_empty() && !self.fix.trim().is_empty()
    }

    /// High and critical flags are expected to carry evidence
    pub fn lacks_required_evidence(&self) -> bool {
        self.severity >= Severity::High && self.evidence.is_empty()
    }

    /// Arbiter penalty weight; unevidenced flags count half
    pub fn severity_weight(&self) -> f64 {
        if self.evidence.is_empty() {
            self.severity.weight() / 2.0
        } else {
            self.severity.weight()
        }
    }
}

/// Per-severity tally of a flag list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = &'a RedFlag>) -> Self {
        let mut counts = Self::default();
        for flag in flags {
            match flag.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Drop repeated (severity, title, location) flags, keeping first occurrences in order
pub fn dedupe_flags(flags: Vec<RedFlag>) -> Vec<RedFlag> {
    let mut seen = HashSet::new();
    flags
        .into_iter()
        .filter(|flag| {
            seen.insert((
                flag.severity,
                flag.title.clone(),
                flag.location.clone(),
            ))
        })
        .collect()
}
