//! Configuration loading and path resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every setting resolves in
//! this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the tool warns and runs on compiled
//! defaults. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CQA_CONFIG";

/// Environment variable overriding the license tier
pub const TIER_ENV_VAR: &str = "CQA_TIER";

/// Environment variable overriding the usage ledger location
pub const USAGE_FILE_ENV_VAR: &str = "CQA_USAGE_FILE";

/// Environment variable overriding the log level
pub const LOG_ENV_VAR: &str = "CQA_LOG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Pipeline limits and execution policy
    #[serde(default)]
    pub audit: AuditSection,

    /// License tier and usage ledger
    #[serde(default)]
    pub license: LicenseSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[audit]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSection {
    /// Wall-clock cap for a single phase
    #[serde(default = "default_phase_timeout_secs")]
    pub phase_timeout_secs: u64,

    /// Wall-clock cap for a single external command spawned by an analyzer
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Wall-clock cap for a single validation cycle
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Allow analyzers to spawn build and probe commands in the target project
    #[serde(default)]
    pub allow_exec: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            phase_timeout_secs: default_phase_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            allow_exec: false,
        }
    }
}

/// `[license]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseSection {
    /// License tier name: free, pro or enterprise
    #[serde(default = "default_tier")]
    pub tier: String,

    /// Monthly usage ledger path (defaults to the platform data directory)
    #[serde(default)]
    pub usage_file: Option<PathBuf>,
}

impl Default for LicenseSection {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            usage_file: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_phase_timeout_secs() -> u64 {
    120
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_cycle_timeout_secs() -> u64 {
    60
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    /// Default config file location
    pub config_file: PathBuf,
    /// Default usage ledger location
    pub usage_file: PathBuf,
    /// Default log level
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let config_file = dirs::config_dir()
            .map(|d| d.join("cqa").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./cqa/config.toml"));

        let usage_file = dirs::data_local_dir()
            .map(|d| d.join("cqa").join("usage.json"))
            .unwrap_or_else(|| PathBuf::from("./cqa_data/usage.json"));

        Self {
            config_file,
            usage_file,
            log_level: default_log_level(),
        }
    }
}

/// Locates the bootstrap config file
///
/// Explicit path → `CQA_CONFIG` → platform config dir. Only the platform default
/// is allowed to be absent.
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve the config file to read, if any
    pub fn resolve(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.cli_path {
            return require_file(path).map(Some);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return require_file(Path::new(&path)).map(Some);
            }
        }

        let default = CompiledDefaults::for_current_platform().config_file;
        if default.is_file() {
            Ok(Some(default))
        } else {
            debug!("No config file at {}, using compiled defaults", default.display());
            Ok(None)
        }
    }

    /// Resolve and load, falling back to defaults when no file exists
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve()? {
            Some(path) => load_toml_config(&path),
            None => {
                warn!("No configuration file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

fn require_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Pick the first present value: CLI, then environment variable, then config
pub fn resolve_setting(
    cli_value: Option<String>,
    env_var_name: &str,
    config_value: Option<String>,
) -> Option<String> {
    if let Some(value) = cli_value.filter(|v| !v.trim().is_empty()) {
        return Some(value);
    }

    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }

    config_value.filter(|v| !v.trim().is_empty())
}
