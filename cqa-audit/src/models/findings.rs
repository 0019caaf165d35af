//! Per-phase findings
//!
//! Each phase produces one variant of `PhaseFindings`. Only the four scorable
//! phases carry a `score`; the scoring engine ignores the rest.

use super::red_flag::{RedFlag, SeverityCounts};
use crate::types::PhaseId;
use serde::{Deserialize, Serialize};

/// Typed findings of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum PhaseFindings {
    FirstImpressions(FirstImpressionsFindings),
    Installation(InstallationFindings),
    Functionality(FunctionalityFindings),
    Verification(VerificationFindings),
    ErrorHandling(ErrorHandlingFindings),
    RedFlags(RedFlagScanFindings),
}

impl PhaseFindings {
    pub fn phase(&self) -> PhaseId {
        match self {
            PhaseFindings::FirstImpressions(_) => PhaseId::FirstImpressions,
            PhaseFindings::Installation(_) => PhaseId::Installation,
            PhaseFindings::Functionality(_) => PhaseId::Functionality,
            PhaseFindings::Verification(_) => PhaseId::Verification,
            PhaseFindings::ErrorHandling(_) => PhaseId::ErrorHandling,
            PhaseFindings::RedFlags(_) => PhaseId::RedFlags,
        }
    }

    /// Phase score on the 0–10 scale, if the phase produced one
    pub fn score(&self) -> Option<f64> {
        match self {
            PhaseFindings::FirstImpressions(f) => Some(f.score),
            PhaseFindings::Installation(f) => Some(f.score),
            PhaseFindings::Functionality(f) => f.score,
            PhaseFindings::Verification(f) => f.score,
            PhaseFindings::ErrorHandling(_) | PhaseFindings::RedFlags(_) => None,
        }
    }

    /// Flags this phase discovered itself
    pub fn red_flags(&self) -> &[RedFlag] {
        match self {
            PhaseFindings::FirstImpressions(f) => &f.red_flags,
            PhaseFindings::Installation(f) => &f.red_flags,
            PhaseFindings::Functionality(f) => &f.red_flags,
            PhaseFindings::Verification(f) => &f.red_flags,
            PhaseFindings::ErrorHandling(f) => &f.red_flags,
            PhaseFindings::RedFlags(f) => &f.red_flags,
        }
    }

    pub fn as_installation(&self) -> Option<&InstallationFindings> {
        match self {
            PhaseFindings::Installation(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_functionality(&self) -> Option<&FunctionalityFindings> {
        match self {
            PhaseFindings::Functionality(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_verification(&self) -> Option<&VerificationFindings> {
        match self {
            PhaseFindings::Verification(f) => Some(f),
            _ => None,
        }
    }
}

/// Phase 1: documentation quality
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirstImpressionsFindings {
    pub score: f64,
    pub has_readme: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme_path: Option<String>,
    pub has_install_instructions: bool,
    pub has_examples: bool,
    pub has_license: bool,
    pub readme_words: usize,
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

/// How the project expects to be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMethod {
    Cargo,
    Npm,
    Pip,
    Go,
    Make,
}

impl InstallMethod {
    /// Build command attempted when execution is allowed
    pub fn command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            InstallMethod::Cargo => ("cargo", &["build", "--quiet"]),
            InstallMethod::Npm => ("npm", &["install", "--no-audit", "--no-fund"]),
            InstallMethod::Pip => ("pip", &["install", "--dry-run", "."]),
            InstallMethod::Go => ("go", &["build", "./..."]),
            InstallMethod::Make => ("make", &[]),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstallMethod::Cargo => "cargo",
            InstallMethod::Npm => "npm",
            InstallMethod::Pip => "pip",
            InstallMethod::Go => "go",
            InstallMethod::Make => "make",
        }
    }
}

/// Phase 2: install outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallationFindings {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<InstallMethod>,
    /// Manifest file the method was detected from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    pub attempted: bool,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

/// One external command run against the target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// First lines of stdout
    #[serde(default)]
    pub stdout_excerpt: String,
    /// First lines of stderr
    #[serde(default)]
    pub stderr_excerpt: String,
}

/// Phase 3: command executions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionalityFindings {
    /// Success ratio × 10; absent when nothing could be run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub executions: Vec<CommandExecution>,
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

impl FunctionalityFindings {
    pub fn successful_executions(&self) -> usize {
        self.executions.iter().filter(|e| e.success).count()
    }
}

/// Where a claim was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimSource {
    Readme,
    Context,
}

/// A single documented claim and whether it could be backed up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimCheck {
    pub claim: String,
    pub source: ClaimSource,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Phase 4: verified and unverifiable claims
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationFindings {
    /// Verified ratio × 10; absent when no claims were found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub claims: Vec<ClaimCheck>,
    pub context_used: bool,
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

impl VerificationFindings {
    pub fn unverified(&self) -> impl Iterator<Item = &ClaimCheck> {
        self.claims.iter().filter(|c| !c.verified)
    }
}

/// Phase 5: error-handling gaps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandlingFindings {
    #[serde(default)]
    pub probes: Vec<CommandExecution>,
    /// Source locations that discard errors silently
    pub swallowed_error_sites: usize,
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

/// Phase 6: security and test-coverage scan plus the consolidated tally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedFlagScanFindings {
    pub source_files: usize,
    pub test_files: usize,
    /// test_files / source_files, two decimals
    pub test_ratio: f64,
    /// Severity tally over every phase's flags including this one
    pub consolidated: SeverityCounts,
    /// Flags this phase discovered (security and testing)
    #[serde(default)]
    pub red_flags: Vec<RedFlag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::red_flag::Severity;

    #[test]
    fn test_scorable_variants_expose_score() {
        let first = PhaseFindings::FirstImpressions(FirstImpressionsFindings {
            score: 6.5,
            ..Default::default()
        });
        assert_eq!(first.score(), Some(6.5));
        assert_eq!(first.phase(), PhaseId::FirstImpressions);

        let functionality = PhaseFindings::Functionality(FunctionalityFindings::default());
        assert_eq!(functionality.score(), None);

        let scan = PhaseFindings::RedFlags(RedFlagScanFindings::default());
        assert_eq!(scan.score(), None);
        assert_eq!(scan.phase(), PhaseId::RedFlags);
    }

    #[test]
    fn test_red_flags_accessor() {
        let flag = RedFlag::new(Severity::Low, "testing", "No tests", "none", "add tests");
        let findings = PhaseFindings::ErrorHandling(ErrorHandlingFindings {
            red_flags: vec![flag.clone()],
            ..Default::default()
        });
        assert_eq!(findings.red_flags(), &[flag]);
    }

    #[test]
    fn test_findings_tagged_by_phase() {
        let findings = PhaseFindings::Installation(InstallationFindings {
            score: 7.0,
            method: Some(InstallMethod::Cargo),
            ..Default::default()
        });
        let json = serde_json::to_value(&findings).unwrap();
        assert_eq!(json["phase"], "installation");
        assert_eq!(json["method"], "cargo");

        let back: PhaseFindings = serde_json::from_value(json).unwrap();
        assert_eq!(back, findings);
    }
}
