//! Phase 6: Red Flags
//!
//! Last pass over the project. Scans text files for committed secrets and
//! pipe-to-shell install lines, measures how many test files exist next to
//! the sources, and tallies the severities of every flag raised so far.
//! Only the flags discovered here are reported as this phase's own; earlier
//! phases' flags appear in the tally alone.

use super::probe::{read_text, ProjectFile, ProjectTree};
use crate::models::{category, PhaseFindings, RedFlag, RedFlagScanFindings, Severity, SeverityCounts};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use tracing::{debug, warn};

/// Non-source files still worth scanning for secrets
const CONFIG_EXTENSIONS: &[&str] = &["env", "yml", "yaml", "json", "toml", "ini", "cfg", "conf", "md", "txt", "pem", "key"];
const CONFIG_NAMES: &[&str] = &[".env", "Dockerfile", "Makefile"];

const PASSWORD_KEYS: &[&str] = &["password", "passwd", "secret_key", "api_key", "apikey"];
const PLACEHOLDERS: &[&str] = &["env", "getenv", "changeme", "example", "xxx", "<", "${", "{{", "your"];

/// Evidence lines kept per flag
const MAX_EVIDENCE: usize = 3;
const SPARSE_TEST_RATIO: f64 = 0.1;

/// What a secret-scan rule matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    PrivateKey,
    CloudAccessKey,
    HardcodedPassword,
    PipeToShell,
}

impl SecretKind {
    fn flag(self, file: &str, lines: &[usize]) -> RedFlag {
        let (severity, title, description, fix) = match self {
            SecretKind::PrivateKey => (
                Severity::Critical,
                "Private key committed",
                "A PEM private key block is checked into the repository.",
                "Remove the key from history, rotate it and load keys from outside the repository.",
            ),
            SecretKind::CloudAccessKey => (
                Severity::Critical,
                "Cloud access key committed",
                "A string shaped like an AWS access key id is checked into the repository.",
                "Revoke the key, purge it from history and read credentials from the environment.",
            ),
            SecretKind::HardcodedPassword => (
                Severity::High,
                "Hard-coded credential",
                "A password or API key is assigned a literal value in the source.",
                "Read credentials from the environment or a secrets store.",
            ),
            SecretKind::PipeToShell => (
                Severity::Medium,
                "Pipe-to-shell install",
                "Install instructions pipe a downloaded script straight into a shell.",
                "Publish a checksum or a package and document a verifiable install path.",
            ),
        };
        let category = match self {
            SecretKind::PipeToShell => category::INSTALLATION,
            _ => category::SECURITY,
        };

        let mut flag = RedFlag::new(severity, category, title, description, fix).at(file);
        for line in lines.iter().take(MAX_EVIDENCE) {
            // never echo the secret itself
            flag = flag.with_evidence(format!("{}:{} (value redacted)", file, line));
        }
        flag
    }
}

fn looks_like_aws_key(token: &str) -> bool {
    token.len() == 20
        && token.starts_with("AKIA")
        && token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn hardcoded_credential(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    let Some(key_at) = PASSWORD_KEYS.iter().filter_map(|k| lower.find(k)).min() else {
        return false;
    };
    let rest = &lower[key_at..];
    let Some(assign) = rest.find(['=', ':']) else {
        return false;
    };
    let value = rest[assign + 1..].trim_start();
    let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return false;
    };
    let literal: String = value[1..].chars().take_while(|c| *c != quote).collect();
    !literal.is_empty() && !PLACEHOLDERS.iter().any(|p| literal.contains(p))
}

fn pipes_to_shell(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    let compact: String = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    (compact.contains("curl ") || compact.contains("wget "))
        && ["| sh", "| bash", "|sh", "|bash", "| sudo sh", "| sudo bash"]
            .iter()
            .any(|pipe| compact.contains(pipe))
}

/// Secret-scan hits in one file, grouped by kind, with 1-based line numbers
pub fn scan_text(text: &str) -> Vec<(SecretKind, Vec<usize>)> {
    let mut hits: Vec<(SecretKind, Vec<usize>)> = Vec::new();
    let mut record = |kind: SecretKind, line: usize| match hits.iter_mut().find(|(k, _)| *k == kind) {
        Some((_, lines)) => lines.push(line),
        None => hits.push((kind, vec![line])),
    };

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        if line.contains("-----BEGIN") && line.contains("PRIVATE KEY-----") {
            record(SecretKind::PrivateKey, number);
        }
        if line
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(looks_like_aws_key)
        {
            record(SecretKind::CloudAccessKey, number);
        }
        if hardcoded_credential(line) {
            record(SecretKind::HardcodedPassword, number);
        }
        if pipes_to_shell(line) {
            record(SecretKind::PipeToShell, number);
        }
    }
    hits
}

fn worth_scanning(file: &ProjectFile) -> bool {
    file.is_source()
        || CONFIG_NAMES.contains(&file.file_name())
        || file
            .extension()
            .map(|ext| CONFIG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Two-decimal test-to-source ratio
pub fn test_ratio(test_files: usize, source_files: usize) -> f64 {
    if source_files == 0 {
        return 0.0;
    }
    (test_files as f64 / source_files as f64 * 100.0).round() / 100.0
}

/// Scan result before it is merged with earlier phases
struct Scan {
    source_files: usize,
    test_files: usize,
    flags: Vec<RedFlag>,
    truncated: bool,
}

fn scan_project(tree: &ProjectTree) -> Scan {
    let mut flags = Vec::new();
    for file in tree.files.iter().filter(|f| worth_scanning(f)) {
        let Some(text) = read_text(&tree.absolute(file)) else {
            continue;
        };
        let display = file.display();
        for (kind, lines) in scan_text(&text) {
            flags.push(kind.flag(&display, &lines));
        }
    }

    let test_files = tree.source_files().filter(|f| f.is_test()).count();
    let source_files = tree.source_files().count() - test_files;
    Scan {
        source_files,
        test_files,
        flags,
        truncated: tree.truncated,
    }
}

/// Security, test-coverage and consolidation pass
#[derive(Debug, Default)]
pub struct RedFlagsAnalyzer;

impl RedFlagsAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for RedFlagsAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::RedFlags
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let tree = ProjectTree::snapshot(ctx.target_path).await?;
        let scan = tokio::task::spawn_blocking(move || scan_project(&tree))
            .await
            .map_err(|e| PhaseError::Internal(format!("red flag scan failed: {}", e)))?;

        let mut warnings = Vec::new();
        if scan.truncated {
            warn!("Project tree exceeds scan cap; red flag scan is partial");
            warnings.push("Project too large; only part of the tree was scanned".to_string());
        }

        let mut findings = RedFlagScanFindings {
            source_files: scan.source_files,
            test_files: scan.test_files,
            test_ratio: test_ratio(scan.test_files, scan.source_files),
            red_flags: scan.flags,
            ..Default::default()
        };

        if findings.source_files > 0 && findings.test_files == 0 {
            findings.red_flags.push(
                RedFlag::new(
                    Severity::High,
                    category::TESTING,
                    "No tests",
                    "The project has source files but not a single test file.",
                    "Add automated tests for the main commands.",
                )
                .with_evidence(format!("0 test files among {} source files", findings.source_files)),
            );
        } else if findings.test_files > 0 && findings.test_ratio < SPARSE_TEST_RATIO {
            findings.red_flags.push(
                RedFlag::new(
                    Severity::Low,
                    category::TESTING,
                    "Sparse test coverage",
                    format!(
                        "{} test file(s) for {} source files (ratio {:.2}).",
                        findings.test_files, findings.source_files, findings.test_ratio
                    ),
                    "Cover more modules with tests.",
                ),
            );
        }

        findings.consolidated =
            SeverityCounts::from_flags(ctx.prior_flags().into_iter().chain(findings.red_flags.iter()));

        debug!(
            own_flags = findings.red_flags.len(),
            total_flags = findings.consolidated.total(),
            test_ratio = findings.test_ratio,
            "Red flag scan complete"
        );

        Ok(PhaseOutput::new(PhaseFindings::RedFlags(findings)).with_warnings(warnings))
    }
}
