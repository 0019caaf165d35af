//! Phase 5: Error Handling
//!
//! Feeds bad input to a command that already worked in phase 3 (an unknown
//! flag, a missing input file) and checks that the tool fails loudly and
//! cleanly. A static pass counts source sites that discard errors. This
//! phase is not scored; it only contributes flags.

use super::functionality::find_entry_points;
use super::probe::{read_text, run_command, ProjectTree};
use crate::models::{category, CommandExecution, ErrorHandlingFindings, PhaseFindings, RedFlag, Severity};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use tracing::debug;

const INVALID_FLAG: &str = "--cqa-no-such-option";
const MISSING_FILE: &str = "/nonexistent/cqa-missing-input.txt";

/// Output fragments that mean the tool crashed instead of reporting
const CRASH_MARKERS: &[&str] = &[
    "traceback (most recent call last)",
    "panicked at",
    "stack backtrace",
    "goroutine 1 [running]",
    "exception in thread",
    "unhandledpromiserejection",
    "at object.<anonymous>",
    "segmentation fault",
];

const SWALLOWED_SITES_HIGH: usize = 10;
const MAX_SITE_EVIDENCE: usize = 5;

/// A location where an error is silently dropped
#[derive(Debug, Clone, PartialEq)]
pub struct SwallowedSite {
    pub file: String,
    pub line: usize,
    pub text: String,
}

/// Find error-discarding idioms in one source file
pub fn swallowed_error_sites(file: &str, text: &str) -> Vec<SwallowedSite> {
    let extension = file.rsplit('.').next().unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let mut sites = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

        let hit = match extension {
            "py" => {
                let bare_except = trimmed.starts_with("except") && trimmed.ends_with(':');
                let next_is_pass = lines
                    .get(index + 1)
                    .map(|next| next.trim() == "pass")
                    .unwrap_or(false);
                bare_except && next_is_pass
            }
            "js" | "mjs" | "cjs" | "ts" | "java" | "kt" | "cs" | "php" | "swift" => {
                compact.contains("catch{}") || (compact.contains("catch(") && compact.ends_with("){}"))
            }
            "go" => compact.starts_with("_=err") || compact.contains(",_=os.") || compact.contains(",_:=os."),
            "rs" => (compact.starts_with("let_=") && compact.ends_with(';')) || compact.ends_with(".ok();"),
            _ => false,
        };

        if hit {
            sites.push(SwallowedSite {
                file: file.to_string(),
                line: index + 1,
                text: trimmed.to_string(),
            });
        }
    }
    sites
}

fn crashed(execution: &CommandExecution) -> bool {
    let output = format!("{}\n{}", execution.stdout_excerpt, execution.stderr_excerpt).to_lowercase();
    CRASH_MARKERS.iter().any(|marker| output.contains(marker))
}

/// Judge one bad-input probe
fn assess_probe(execution: &CommandExecution, input: &str) -> Option<RedFlag> {
    if execution.timed_out {
        return Some(
            RedFlag::new(
                Severity::High,
                category::ERROR_HANDLING,
                format!("Hangs on {}", input),
                format!("`{}` never exited.", execution.command),
                "Validate input up front and exit with a non-zero status instead of waiting.",
            )
            .with_evidence(format!("$ {} ({})", execution.command, execution.stderr_excerpt))
            .at(execution.command.clone()),
        );
    }

    if crashed(execution) {
        return Some(
            RedFlag::new(
                Severity::High,
                category::ERROR_HANDLING,
                format!("Crashes on {}", input),
                format!("`{}` produced a crash trace instead of an error message.", execution.command),
                "Catch the error at the entry point and print a one-line message with a non-zero exit code.",
            )
            .with_evidence(format!("$ {}\n{}", execution.command, execution.stderr_excerpt))
            .at(execution.command.clone()),
        );
    }

    if execution.success {
        return Some(
            RedFlag::new(
                Severity::Medium,
                category::ERROR_HANDLING,
                format!("Silently accepts {}", input),
                format!("`{}` exited 0 instead of rejecting the input.", execution.command),
                "Reject unknown options and unreadable inputs with a non-zero exit status.",
            )
            .with_evidence(format!("$ {} (exit 0)", execution.command))
            .at(execution.command.clone()),
        );
    }

    if execution.stderr_excerpt.trim().is_empty() && execution.stdout_excerpt.trim().is_empty() {
        return Some(
            RedFlag::new(
                Severity::Low,
                category::ERROR_HANDLING,
                format!("No error message for {}", input),
                format!("`{}` failed without saying why.", execution.command),
                "Print what went wrong to stderr before exiting.",
            )
            .at(execution.command.clone()),
        );
    }

    None
}

/// Bad-input probes plus a static scan for swallowed errors
#[derive(Debug, Default)]
pub struct ErrorHandlingAnalyzer;

impl ErrorHandlingAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for ErrorHandlingAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::ErrorHandling
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let mut warnings = Vec::new();
        let mut findings = ErrorHandlingFindings::default();

        // Runtime probes need a command that demonstrably starts
        let working = ctx
            .prior_findings(PhaseId::Functionality)
            .and_then(|f| f.as_functionality())
            .filter(|f| f.successful_executions() > 0);

        match (working, ctx.allow_exec) {
            (_, false) => warnings.push("Command execution disabled; runtime error probes skipped".to_string()),
            (None, true) => warnings.push("No working command from functionality phase; runtime error probes skipped".to_string()),
            (Some(functionality), true) => {
                let entry = find_entry_points(ctx.target_path).await?.into_iter().find(|entry| {
                    functionality
                        .executions
                        .iter()
                        .any(|e| e.success && e.command.starts_with(&entry.program))
                });

                if let Some(entry) = entry {
                    for (argument, input) in [(INVALID_FLAG, "an unknown option"), (MISSING_FILE, "a missing input file")] {
                        let mut args: Vec<&str> = entry.leading_args.iter().map(String::as_str).collect();
                        args.push(argument);
                        let execution = run_command(&entry.program, &args, ctx.target_path, ctx.command_timeout).await;
                        debug!(command = %execution.command, exit_code = ?execution.exit_code, "Error probe");
                        if let Some(flag) = assess_probe(&execution, input) {
                            findings.red_flags.push(flag);
                        }
                        findings.probes.push(execution);
                    }
                } else {
                    warnings.push("Entry point from functionality phase no longer found".to_string());
                }
            }
        }

        if let Some(installation) = ctx
            .prior_findings(PhaseId::Installation)
            .and_then(|f| f.as_installation())
        {
            if installation.attempted && !installation.succeeded && installation.errors.len() < 2 {
                findings.red_flags.push(
                    RedFlag::new(
                        Severity::Low,
                        category::ERROR_HANDLING,
                        "Build failure gives no diagnostic",
                        "The install command failed without printing anything on stderr.",
                        "Make build scripts report the failing step.",
                    )
                    .at(installation.command.clone().unwrap_or_default()),
                );
            }
        }

        let root = ctx.target_path.to_path_buf();
        let sites = tokio::task::spawn_blocking(move || {
            let tree = ProjectTree::scan(&root);
            let mut sites = Vec::new();
            for file in tree.source_files().filter(|f| !f.is_test()) {
                if let Some(text) = read_text(&tree.absolute(file)) {
                    sites.extend(swallowed_error_sites(&file.display(), &text));
                }
            }
            sites
        })
        .await
        .map_err(|e| PhaseError::Internal(format!("error-handling scan failed: {}", e)))?;

        findings.swallowed_error_sites = sites.len();
        if let Some(first) = sites.first() {
            let severity = if sites.len() >= SWALLOWED_SITES_HIGH {
                Severity::High
            } else {
                Severity::Medium
            };
            let mut flag = RedFlag::new(
                severity,
                category::ERROR_HANDLING,
                "Errors silently swallowed",
                format!("{} place(s) in the source discard errors without reporting them.", sites.len()),
                "Propagate or log errors instead of discarding them.",
            )
            .at(format!("{}:{}", first.file, first.line));
            for site in sites.iter().take(MAX_SITE_EVIDENCE) {
                flag = flag.with_evidence(format!("{}:{}: {}", site.file, site.line, site.text));
            }
            findings.red_flags.push(flag);
        }

        Ok(PhaseOutput::new(PhaseFindings::ErrorHandling(findings)).with_warnings(warnings))
    }
}
