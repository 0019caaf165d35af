//! Phase 3: Functionality
//!
//! Finds the project's runnable entry points and, when execution is allowed,
//! invokes each one with `--help` and `--version`. Score is the success ratio
//! of those invocations on the 0–10 scale; with nothing run there is no score.

use super::probe::{read_text, run_command};
use crate::models::{category, FunctionalityFindings, PhaseFindings, RedFlag, Severity};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use crate::workflow::scoring::round_one_decimal;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Arguments every entry point is probed with
const PROBE_ARGS: &[&str] = &["--help", "--version"];

/// At most this many entry points are exercised
const MAX_ENTRY_POINTS: usize = 5;

/// Python scripts runnable straight from a checkout
const PYTHON_SCRIPTS: &[&str] = &["__main__.py", "main.py", "cli.py"];

/// A way to start the tool
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    /// Name shown in findings
    pub name: String,
    /// Program to spawn
    pub program: String,
    /// Arguments placed before the probe argument (script path for interpreters)
    pub leading_args: Vec<String>,
}

impl EntryPoint {
    fn direct(name: impl Into<String>, program: &Path) -> Self {
        Self {
            name: name.into(),
            program: program.to_string_lossy().into_owned(),
            leading_args: Vec::new(),
        }
    }

    fn interpreted(name: impl Into<String>, interpreter: &str, script: &str) -> Self {
        Self {
            name: name.into(),
            program: interpreter.to_string(),
            leading_args: vec![script.to_string()],
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Executables in `bin/`
fn bin_dir_entries(root: &Path) -> Vec<EntryPoint> {
    let Ok(entries) = std::fs::read_dir(root.join("bin")) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_executable(p))
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|p| {
            let name = p
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("bin")
                .to_string();
            EntryPoint::direct(format!("bin/{}", name), p)
        })
        .collect()
}

/// `bin` field of package.json, either a string or a name → path map
fn package_json_entries(root: &Path) -> Vec<EntryPoint> {
    let Some(text) = read_text(&root.join("package.json")) else {
        return Vec::new();
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&text) else {
        debug!("package.json is not valid JSON");
        return Vec::new();
    };

    match manifest.get("bin") {
        Some(serde_json::Value::String(script)) => {
            let name = manifest
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("package")
                .to_string();
            vec![EntryPoint::interpreted(name, "node", script)]
        }
        // serde_json's Map is ordered by key, so the result is deterministic
        Some(serde_json::Value::Object(bins)) => bins
            .iter()
            .filter_map(|(name, script)| {
                script
                    .as_str()
                    .map(|s| EntryPoint::interpreted(name.clone(), "node", s))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Binary names a Cargo manifest declares
pub fn cargo_binary_names(manifest: &str) -> Vec<String> {
    let Ok(value) = manifest.parse::<toml::Value>() else {
        return Vec::new();
    };

    let mut names: Vec<String> = value
        .get("bin")
        .and_then(|b| b.as_array())
        .map(|bins| {
            bins.iter()
                .filter_map(|b| b.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(package) = value
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    {
        if !names.iter().any(|n| n == package) {
            names.push(package.to_string());
        }
    }
    names
}

/// Cargo binaries that have already been built under `target/`
fn cargo_entries(root: &Path) -> Vec<EntryPoint> {
    let Some(text) = read_text(&root.join("Cargo.toml")) else {
        return Vec::new();
    };

    cargo_binary_names(&text)
        .into_iter()
        .filter_map(|name| {
            let file = if cfg!(windows) { format!("{}.exe", name) } else { name.clone() };
            ["release", "debug"]
                .iter()
                .map(|profile| root.join("target").join(profile).join(&file))
                .find(|p| is_executable(p))
                .map(|p| EntryPoint::direct(name, &p))
        })
        .collect()
}

fn python_entries(root: &Path) -> Vec<EntryPoint> {
    PYTHON_SCRIPTS
        .iter()
        .filter(|script| root.join(script).is_file())
        .map(|script| EntryPoint::interpreted(*script, "python3", script))
        .collect()
}

/// Every entry point found in the project, capped
pub fn discover_entry_points(root: &Path) -> Vec<EntryPoint> {
    let mut found = Vec::new();
    found.extend(bin_dir_entries(root));
    found.extend(package_json_entries(root));
    found.extend(cargo_entries(root));
    found.extend(python_entries(root));

    let mut seen = std::collections::HashSet::new();
    found.retain(|e| seen.insert(e.name.clone()));
    found.truncate(MAX_ENTRY_POINTS);
    found
}

/// [`discover_entry_points`] on the blocking pool, so the phase timeout can fire
pub async fn find_entry_points(root: &Path) -> Result<Vec<EntryPoint>, PhaseError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || discover_entry_points(&root))
        .await
        .map_err(|e| PhaseError::Internal(format!("entry point discovery task failed: {}", e)))
}

/// Entry-point discovery and smoke-run analyzer
#[derive(Debug, Default)]
pub struct FunctionalityAnalyzer;

impl FunctionalityAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for FunctionalityAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::Functionality
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let entry_points = find_entry_points(ctx.target_path).await?;
        let mut warnings = Vec::new();
        let mut findings = FunctionalityFindings {
            entry_points: entry_points.iter().map(|e| e.name.clone()).collect(),
            ..Default::default()
        };

        if entry_points.is_empty() {
            findings.red_flags.push(
                RedFlag::new(
                    Severity::Medium,
                    category::FUNCTIONALITY,
                    "No runnable entry point",
                    "No executable in bin/, no package.json bin, no built Cargo binary and no runnable script was found, so the tool could not be exercised.",
                    "Provide a documented entry point (a bin script or a declared binary target).",
                )
                .with_evidence("searched bin/, package.json bin, target/{release,debug}, __main__.py, main.py, cli.py"),
            );
            return Ok(PhaseOutput::new(PhaseFindings::Functionality(findings)).with_warnings(warnings));
        }

        if !ctx.allow_exec {
            warnings.push(format!(
                "Command execution disabled; {} entry point(s) not run",
                entry_points.len()
            ));
            return Ok(PhaseOutput::new(PhaseFindings::Functionality(findings)).with_warnings(warnings));
        }

        for entry in &entry_points {
            let mut failed = Vec::new();
            for probe in PROBE_ARGS.iter().copied() {
                let mut args: Vec<&str> = entry.leading_args.iter().map(String::as_str).collect();
                args.push(probe);
                let execution = run_command(&entry.program, &args, ctx.target_path, ctx.command_timeout).await;
                debug!(
                    command = %execution.command,
                    success = execution.success,
                    duration_ms = execution.duration_ms,
                    "Entry point probed"
                );
                if !execution.success {
                    failed.push(execution.clone());
                }
                findings.executions.push(execution);
            }

            if failed.is_empty() {
                continue;
            }
            let all_failed = failed.len() == PROBE_ARGS.len();
            let (severity, title) = if all_failed {
                (Severity::High, format!("{} does not run", entry.name))
            } else {
                (Severity::Medium, format!("{} rejects a standard flag", entry.name))
            };
            let mut flag = RedFlag::new(
                severity,
                category::FUNCTIONALITY,
                title,
                format!(
                    "{} of {} basic invocations of {} failed.",
                    failed.len(),
                    PROBE_ARGS.len(),
                    entry.name
                ),
                "Make --help and --version succeed and exit 0.",
            )
            .at(entry.name.clone());
            for execution in &failed {
                let detail = match execution.exit_code {
                    Some(code) => format!("$ {} (exit {}) {}", execution.command, code, execution.stderr_excerpt),
                    None => format!("$ {} {}", execution.command, execution.stderr_excerpt),
                };
                flag = flag.with_evidence(detail.trim_end().to_string());
            }
            findings.red_flags.push(flag);
        }

        let total = findings.executions.len();
        let ratio = findings.successful_executions() as f64 / total as f64;
        findings.score = Some(round_one_decimal(ratio * 10.0));

        info!(
            entry_points = entry_points.len(),
            executions = total,
            succeeded = findings.successful_executions(),
            "Entry points exercised"
        );

        Ok(PhaseOutput::new(PhaseFindings::Functionality(findings)).with_warnings(warnings))
    }
}
