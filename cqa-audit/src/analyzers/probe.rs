//! Target project probes shared by the analyzers
//!
//! Read-only filesystem snapshotting and bounded external command execution.
//! Directory walks run on the blocking pool so the phase timeout can still
//! fire while a large tree is being scanned.

use crate::models::CommandExecution;
use crate::types::PhaseError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
];

/// Extensions treated as source code
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "mjs", "cjs", "ts", "go", "rb", "java", "kt", "c", "h", "cc", "cpp",
    "hpp", "cs", "sh", "bash", "php", "swift",
];

/// Snapshot caps
const MAX_FILES: usize = 5_000;
const MAX_TEXT_BYTES: u64 = 512 * 1024;
const EXCERPT_LINES: usize = 20;
const EXCERPT_CHARS: usize = 2_000;

/// One file in the snapshot, path relative to the project root
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub relative: PathBuf,
    pub size: u64,
}

impl ProjectFile {
    pub fn extension(&self) -> Option<&str> {
        self.relative.extension().and_then(|e| e.to_str())
    }

    pub fn file_name(&self) -> &str {
        self.relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn is_source(&self) -> bool {
        self.extension()
            .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    }

    /// Test file by name or by living under a test directory
    pub fn is_test(&self) -> bool {
        if !self.is_source() {
            return false;
        }
        let name = self.file_name().to_ascii_lowercase();
        let in_test_dir = self.relative.components().any(|c| {
            matches!(
                c.as_os_str().to_str(),
                Some("tests") | Some("test") | Some("__tests__") | Some("spec")
            )
        });
        in_test_dir
            || name.starts_with("test_")
            || name.ends_with("_test.go")
            || name.ends_with("_test.py")
            || name.contains(".test.")
            || name.contains(".spec.")
    }

    pub fn display(&self) -> String {
        self.relative.to_string_lossy().replace('\\', "/")
    }
}

/// Read-only listing of the target project
#[derive(Debug, Clone, Default)]
pub struct ProjectTree {
    pub root: PathBuf,
    pub files: Vec<ProjectFile>,
    /// Walk stopped at the file cap
    pub truncated: bool,
    /// Entries that could not be read
    pub errors: Vec<String>,
}

impl ProjectTree {
    /// Walk `root` synchronously
    pub fn scan(root: &Path) -> Self {
        let mut tree = ProjectTree {
            root: root.to_path_buf(),
            ..Default::default()
        };

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    if tree.files.len() >= MAX_FILES {
                        tree.truncated = true;
                        break;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(root)
                        .unwrap_or(entry.path())
                        .to_path_buf();
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    tree.files.push(ProjectFile { relative, size });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Error accessing entry: {}", e);
                    tree.errors.push(e.to_string());
                }
            }
        }

        tree
    }

    /// Walk `root` on the blocking pool
    pub async fn snapshot(root: &Path) -> Result<Self, PhaseError> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || ProjectTree::scan(&root))
            .await
            .map_err(|e| PhaseError::Internal(format!("project scan task failed: {}", e)))
    }

    pub fn absolute(&self, file: &ProjectFile) -> PathBuf {
        self.root.join(&file.relative)
    }

    pub fn source_files(&self) -> impl Iterator<Item = &ProjectFile> {
        self.files.iter().filter(|f| f.is_source())
    }

    /// Files directly in the project root
    pub fn top_level(&self) -> impl Iterator<Item = &ProjectFile> {
        self.files
            .iter()
            .filter(|f| f.relative.components().count() == 1)
    }

    pub fn has_top_level(&self, name: &str) -> bool {
        self.top_level().any(|f| f.file_name() == name)
    }

    /// Read every text-sized source file (skipping unreadable or binary ones)
    pub fn read_sources(&self) -> Vec<(String, String)> {
        self.source_files()
            .filter_map(|f| read_text(&self.absolute(f)).map(|text| (f.display(), text)))
            .collect()
    }
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Read a regular file as UTF-8 text, `None` if too large, unreadable or binary
///
/// FIFOs, devices and other special files (also behind symlinks) are never
/// opened, and at most `MAX_TEXT_BYTES + 1` bytes are read.
pub fn read_text(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() || metadata.len() > MAX_TEXT_BYTES {
        return None;
    }
    let mut bytes = Vec::new();
    File::open(path)
        .ok()?
        .take(MAX_TEXT_BYTES + 1)
        .read_to_end(&mut bytes)
        .ok()?;
    if bytes.len() as u64 > MAX_TEXT_BYTES {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Locate the README in the project root (case-insensitive, any extension)
pub fn find_readme(root: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        // follows symlinks, so README.md -> docs/README.md counts
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_ascii_lowercase().starts_with("readme"))
                .unwrap_or(false)
        })
        .collect();

    // README.md before README.txt before README
    candidates.sort_by_key(|path| {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => 0,
            Some("rst") => 1,
            Some("txt") => 2,
            None => 3,
            _ => 4,
        }
    });
    candidates.into_iter().next()
}

/// Keep the first lines of command output
pub fn excerpt(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let mut excerpt: String = text
        .lines()
        .take(EXCERPT_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    if excerpt.len() > EXCERPT_CHARS {
        let mut cut = EXCERPT_CHARS;
        while !excerpt.is_char_boundary(cut) {
            cut -= 1;
        }
        excerpt.truncate(cut);
    }
    excerpt
}

/// Run a command in `cwd`, bounded by `timeout`
///
/// Never fails: a spawn error or timeout is recorded on the returned
/// `CommandExecution`. The child is killed when the timeout elapses.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> CommandExecution {
    let command_line = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let started = Instant::now();
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(command = %command_line, error = %e, "Spawn failed");
            return CommandExecution {
                command: command_line,
                success: false,
                exit_code: None,
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
                stdout_excerpt: String::new(),
                stderr_excerpt: format!("failed to spawn: {}", e),
            };
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandExecution {
            command: command_line,
            success: output.status.success(),
            exit_code: output.status.code(),
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out: false,
            stdout_excerpt: excerpt(&output.stdout),
            stderr_excerpt: excerpt(&output.stderr),
        },
        Ok(Err(e)) => CommandExecution {
            command: command_line,
            success: false,
            exit_code: None,
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out: false,
            stdout_excerpt: String::new(),
            stderr_excerpt: format!("failed to collect output: {}", e),
        },
        Err(_) => {
            tracing::warn!(command = %command_line, timeout_secs = timeout.as_secs(), "Command timed out");
            CommandExecution {
                command: command_line,
                success: false,
                exit_code: None,
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: true,
                stdout_excerpt: String::new(),
                stderr_excerpt: format!("timed out after {}s", timeout.as_secs()),
            }
        }
    }
}
