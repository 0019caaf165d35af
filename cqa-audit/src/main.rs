//! CLI Quality Auditor (cqa-audit) - Main entry point
//!
//! Runs one audit against a project directory and emits the finished session
//! as JSON. The binary plays the caller role around the audit core: it checks
//! the monthly quota, runs the orchestrator, records usage and persists the
//! session.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cqa_audit::models::{AuditOptions, Tier};
use cqa_audit::services::quota::{ensure_allowed, QuotaGate, UsageLedger};
use cqa_audit::services::session_store;
use cqa_audit::services::{OrchestratorSettings, SessionOrchestrator};
use cqa_common::config::{
    resolve_setting, CompiledDefaults, ConfigResolver, TomlConfig, LOG_ENV_VAR, TIER_ENV_VAR,
    USAGE_FILE_ENV_VAR,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for cqa-audit
#[derive(Parser, Debug)]
#[command(name = "cqa-audit")]
#[command(about = "Audit a command-line project: docs, install, behaviour, claims and red flags")]
#[command(version)]
struct Args {
    /// Bootstrap config file
    #[arg(long, global = true, env = "CQA_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit a project directory
    Run {
        /// Project root to audit
        target: PathBuf,

        /// Domain context used to check the project's claims
        #[arg(long)]
        context: Option<String>,

        /// License tier: free, pro or enterprise
        #[arg(long)]
        tier: Option<String>,

        /// Skip the validation protocol even if the tier includes it
        #[arg(long)]
        no_validate: bool,

        /// Allow build and probe commands to run inside the target
        #[arg(long)]
        exec: bool,

        /// Write the session JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Monthly usage ledger
        #[arg(long)]
        usage_file: Option<PathBuf>,
    },

    /// Print a saved session
    Show {
        /// Session JSON written by `run --output`
        session: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    init_tracing(&config, args.verbose)?;

    match args.command {
        Command::Run {
            target,
            context,
            tier,
            no_validate,
            exec,
            output,
            usage_file,
        } => {
            let tier = resolve_tier(tier, &config)?;
            let usage_file = usage_file
                .or_else(|| {
                    std::env::var(USAGE_FILE_ENV_VAR)
                        .ok()
                        .filter(|v| !v.trim().is_empty())
                        .map(PathBuf::from)
                })
                .or_else(|| config.license.usage_file.clone())
                .unwrap_or_else(|| CompiledDefaults::for_current_platform().usage_file);

            let mut options = AuditOptions::for_tier(tier).with_validation(!no_validate);
            if let Some(context) = context {
                options = options.with_context(context);
            }
            options.verbose = args.verbose;

            let mut settings = OrchestratorSettings::from_config(&config.audit);
            settings.allow_exec |= exec;

            run_audit(target, options, settings, usage_file, output).await
        }
        Command::Show { session } => {
            let loaded = session_store::load(&session)
                .await
                .with_context(|| format!("Failed to read session {}", session.display()))?;
            let counts = loaded.severity_counts();
            info!(
                session_id = %loaded.session_id,
                score = ?loaded.score,
                grade = ?loaded.grade().map(|g| g.to_string()),
                critical = counts.critical,
                high = counts.high,
                red_flags = counts.total(),
                "Session loaded"
            );
            println!("{}", session_store::to_json(&loaded)?);
            Ok(())
        }
    }
}

async fn run_audit(
    target: PathBuf,
    options: AuditOptions,
    settings: OrchestratorSettings,
    usage_file: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let ledger = UsageLedger::new(usage_file);
    ensure_allowed(&ledger, options.tier)
        .await
        .with_context(|| format!("Quota check failed (ledger {})", ledger.path().display()))?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let orchestrator = SessionOrchestrator::reference(settings);
    let session = orchestrator
        .run(&target, options, cancel)
        .await
        .with_context(|| format!("Audit of {} could not start", target.display()))?;

    // usage accounting must not cost the caller a finished audit
    if let Err(e) = ledger.record_audit(&session.target_path).await {
        warn!(error = %e, "Failed to record audit usage");
    }

    match output {
        Some(path) => {
            session_store::save(&session, &path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Session written");
        }
        None => println!("{}", session_store::to_json(&session)?),
    }

    Ok(())
}

fn resolve_tier(cli: Option<String>, config: &TomlConfig) -> Result<Tier> {
    let value = resolve_setting(cli, TIER_ENV_VAR, Some(config.license.tier.clone()))
        .unwrap_or_else(|| Tier::default().to_string());
    value.parse::<Tier>().map_err(|e| anyhow!(e))
}

fn init_tracing(config: &TomlConfig, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = resolve_setting(None, LOG_ENV_VAR, Some(config.logging.level.clone()))
                .unwrap_or_else(|| "info".to_string());
            EnvFilter::new(level)
        })
    };

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    // stdout carries the session JSON, logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Cancel the audit on Ctrl+C; in-flight work finishes or times out
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling audit");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
