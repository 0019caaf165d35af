//! Phase 1: First Impressions
//!
//! Documentation quality as a new user meets it: is there a README, does it
//! say how to install the tool, does it show how to use it.
//!
//! # Scoring (0–10)
//! - README present: 3.0
//! - Install instructions: 2.0
//! - Usage examples: 2.0
//! - README length: 1.5 (≥ 150 words), 0.75 (≥ 50 words)
//! - License file: 1.0
//! - Section structure (≥ 2 headings): 0.5

use super::probe::{find_readme, read_text};
use crate::models::{category, FirstImpressionsFindings, PhaseFindings, RedFlag, Severity};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use std::path::Path;
use tracing::debug;

const INSTALL_COMMANDS: &[&str] = &[
    "cargo install",
    "npm install",
    "npm i ",
    "yarn add",
    "pnpm add",
    "pip install",
    "pipx install",
    "go install",
    "brew install",
    "apt install",
    "apt-get install",
    "make install",
    "docker pull",
];

const EXAMPLE_HEADINGS: &[&str] = &["usage", "example", "quick start", "quickstart", "getting started", "tutorial"];

const LICENSE_FILES: &[&str] = &["license", "license.md", "license.txt", "licence", "copying", "license-mit", "license-apache"];

/// What the README text shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadmeAssessment {
    pub words: usize,
    pub headings: usize,
    pub code_blocks: usize,
    pub has_install_instructions: bool,
    pub has_examples: bool,
}

/// Inspect README markdown/plain text
pub fn assess_readme(text: &str) -> ReadmeAssessment {
    let mut assessment = ReadmeAssessment {
        words: text.split_whitespace().count(),
        ..Default::default()
    };

    let mut fences = 0;
    for line in text.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_ascii_lowercase();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fences += 1;
            continue;
        }

        let is_heading = trimmed.starts_with('#');
        if is_heading {
            assessment.headings += 1;
            if lower.contains("install") {
                assessment.has_install_instructions = true;
            }
            if EXAMPLE_HEADINGS.iter().any(|h| lower.contains(h)) {
                assessment.has_examples = true;
            }
        }

        if INSTALL_COMMANDS.iter().any(|cmd| lower.contains(cmd)) {
            assessment.has_install_instructions = true;
        }
    }

    assessment.code_blocks = fences / 2;
    if assessment.code_blocks >= 2 {
        assessment.has_examples = true;
    }

    assessment
}

fn has_license_file(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| LICENSE_FILES.contains(&name.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// README-driven documentation analyzer
#[derive(Debug, Default)]
pub struct FirstImpressionsAnalyzer;

impl FirstImpressionsAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, root: &Path) -> (FirstImpressionsFindings, Vec<String>) {
        let mut warnings = Vec::new();
        let mut findings = FirstImpressionsFindings {
            has_license: has_license_file(root),
            ..Default::default()
        };

        let readme_path = find_readme(root);
        let assessment = match &readme_path {
            Some(path) => match read_text(path) {
                Some(text) => assess_readme(&text),
                None => {
                    warnings.push(format!(
                        "README at {} is unreadable, too large or not UTF-8",
                        path.display()
                    ));
                    ReadmeAssessment::default()
                }
            },
            None => ReadmeAssessment::default(),
        };

        findings.has_readme = readme_path.is_some();
        findings.readme_path = readme_path.as_ref().and_then(|p| {
            p.file_name().and_then(|n| n.to_str()).map(str::to_string)
        });
        findings.has_install_instructions = assessment.has_install_instructions;
        findings.has_examples = assessment.has_examples;
        findings.readme_words = assessment.words;

        let mut score = 0.0;
        if findings.has_readme {
            score += 3.0;
        }
        if findings.has_install_instructions {
            score += 2.0;
        }
        if findings.has_examples {
            score += 2.0;
        }
        if assessment.words >= 150 {
            score += 1.5;
        } else if assessment.words >= 50 {
            score += 0.75;
        }
        if findings.has_license {
            score += 1.0;
        }
        if assessment.headings >= 2 {
            score += 0.5;
        }
        findings.score = score;

        let readme_location = findings.readme_path.clone().unwrap_or_else(|| "README.md".to_string());

        if !findings.has_readme {
            findings.red_flags.push(
                RedFlag::new(
                    Severity::High,
                    category::DOCUMENTATION,
                    "No README",
                    "The project root has no README, so users get no overview, install steps or usage.",
                    "Add a README.md describing what the tool does, how to install it and a usage example.",
                )
                .with_evidence(format!("no README* file in {}", root.display()))
                .at("README.md"),
            );
        } else {
            if !findings.has_install_instructions {
                findings.red_flags.push(
                    RedFlag::new(
                        Severity::Medium,
                        category::DOCUMENTATION,
                        "Missing installation instructions",
                        "The README never explains how to install the tool.",
                        "Add an Installation section with the exact install command.",
                    )
                    .with_evidence("no install heading or install command found in README")
                    .at(readme_location.clone()),
                );
            }
            if !findings.has_examples {
                findings.red_flags.push(
                    RedFlag::new(
                        Severity::Low,
                        category::DOCUMENTATION,
                        "No usage examples",
                        "The README shows no usage section or example invocations.",
                        "Add a Usage section with at least one copy-pasteable example.",
                    )
                    .at(readme_location),
                );
            }
        }

        if !findings.has_license {
            findings.red_flags.push(RedFlag::new(
                Severity::Low,
                category::DOCUMENTATION,
                "No license file",
                "Without a license file users cannot tell whether they may use the tool.",
                "Add a LICENSE file naming the project's license.",
            ));
        }

        debug!(
            score = findings.score,
            readme = findings.has_readme,
            install = findings.has_install_instructions,
            examples = findings.has_examples,
            "First impressions assessed"
        );

        (findings, warnings)
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for FirstImpressionsAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::FirstImpressions
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let root = ctx.target_path.to_path_buf();
        let analyzer = Self::new();
        let (findings, warnings) = tokio::task::spawn_blocking(move || analyzer.evaluate(&root))
            .await
            .map_err(|e| PhaseError::Internal(format!("first impressions task failed: {}", e)))?;

        Ok(PhaseOutput::new(PhaseFindings::FirstImpressions(findings)).with_warnings(warnings))
    }
}
