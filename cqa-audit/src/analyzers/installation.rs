//! Phase 2: Installation
//!
//! Detects how the project is meant to be built from its manifest files and,
//! when execution is allowed, actually attempts the build with a bounded
//! external process.
//!
//! # Scoring (0–10)
//! - Build attempted and succeeded: 10
//! - Method detected, not attempted: 7
//! - Build attempted and failed: 3
//! - No recognizable build method: 2

use super::probe::run_command;
use crate::models::{category, InstallMethod, InstallationFindings, PhaseFindings, RedFlag, Severity};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use std::path::Path;
use tracing::{debug, info};

/// Manifest → method, first match wins
const MANIFESTS: &[(&str, InstallMethod)] = &[
    ("Cargo.toml", InstallMethod::Cargo),
    ("package.json", InstallMethod::Npm),
    ("pyproject.toml", InstallMethod::Pip),
    ("setup.py", InstallMethod::Pip),
    ("go.mod", InstallMethod::Go),
    ("Makefile", InstallMethod::Make),
];

/// Every manifest present in the project root, in precedence order
pub fn detect_methods(root: &Path) -> Vec<(&'static str, InstallMethod)> {
    MANIFESTS
        .iter()
        .filter(|(file, _)| root.join(file).is_file())
        .copied()
        .collect()
}

/// Manifest-driven install analyzer
#[derive(Debug, Default)]
pub struct InstallationAnalyzer;

impl InstallationAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for InstallationAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::Installation
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let detected = detect_methods(ctx.target_path);
        let mut warnings = Vec::new();
        let mut findings = InstallationFindings::default();

        if detected.len() > 1 {
            let names: Vec<&str> = detected.iter().map(|(file, _)| *file).collect();
            warnings.push(format!("Multiple build manifests found: {}", names.join(", ")));
        }

        let Some((manifest, method)) = detected.first().copied() else {
            findings.score = 2.0;
            findings.red_flags.push(
                RedFlag::new(
                    Severity::High,
                    category::INSTALLATION,
                    "No recognizable build or install method",
                    "None of Cargo.toml, package.json, pyproject.toml, setup.py, go.mod or Makefile exist, so there is no standard way to install the tool.",
                    "Ship a standard build manifest for the project's language.",
                )
                .with_evidence(format!("no build manifest in {}", ctx.target_path.display())),
            );
            debug!("No install method detected");
            return Ok(PhaseOutput::new(PhaseFindings::Installation(findings)).with_warnings(warnings));
        };

        findings.method = Some(method);
        findings.manifest = Some(manifest.to_string());

        let (program, args) = method.command();
        let command_line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        findings.command = Some(command_line.clone());

        if !ctx.allow_exec {
            findings.score = 7.0;
            debug!(method = method.as_str(), "Install method detected, execution disabled");
            return Ok(PhaseOutput::new(PhaseFindings::Installation(findings)).with_warnings(warnings));
        }

        info!(command = %command_line, "Attempting installation");
        findings.attempted = true;
        let execution = run_command(program, args, ctx.target_path, ctx.command_timeout).await;
        findings.succeeded = execution.success;

        if execution.success {
            findings.score = 10.0;
        } else {
            findings.score = 3.0;
            let reason = if execution.timed_out {
                format!("timed out after {}s", ctx.command_timeout.as_secs())
            } else {
                match execution.exit_code {
                    Some(code) => format!("exited with status {}", code),
                    None => "did not run".to_string(),
                }
            };
            findings.errors.push(format!("{} {}", command_line, reason));
            if !execution.stderr_excerpt.is_empty() {
                findings.errors.push(execution.stderr_excerpt.clone());
            }

            let mut flag = RedFlag::new(
                Severity::Critical,
                category::INSTALLATION,
                "Installation fails",
                format!("The documented build path ({}) {}.", command_line, reason),
                "Make the standard build command succeed from a clean checkout and pin the required toolchain.",
            )
            .at(manifest);
            flag = flag.with_evidence(format!("$ {}", command_line));
            if !execution.stderr_excerpt.is_empty() {
                flag = flag.with_evidence(execution.stderr_excerpt.clone());
            }
            findings.red_flags.push(flag);
        }

        Ok(PhaseOutput::new(PhaseFindings::Installation(findings)).with_warnings(warnings))
    }
}
