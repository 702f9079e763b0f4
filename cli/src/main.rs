//! `quire` - language server for documentation projects.
//!
//! Speaks the language server protocol on stdin/stdout. stdout carries
//! protocol frames only, so logs go to `~/.quire/logs/quire.log` (or
//! `./.quire/logs/quire.log` when the home directory is unusable), or to
//! stderr with `--stderr-log`.

mod config;

use std::fs::{self, OpenOptions};
use std::io::stderr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use quire_lsp::{LocalProjectFactory, serve};

use crate::config::QuireConfig;

#[derive(Parser)]
#[command(name = "quire")]
#[command(version, about = "Language server for documentation projects")]
struct Cli {
    /// Write logs to stderr instead of the log file.
    #[arg(long)]
    stderr_log: bool,

    /// Log filter directive (overridden by RUST_LOG).
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Accepted for editor compatibility; stdio is the only transport.
    #[arg(long = "stdio", hide = true)]
    _stdio: bool,
}

fn init_tracing(level: Option<&str>, to_stderr: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if to_stderr {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(stderr))
            .with(env_filter)
            .init();
        return;
    }

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout is the protocol channel; without a log file, drop logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(config_path) = QuireConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("quire.log"));
    }

    candidates.push(PathBuf::from(".quire").join("logs").join("quire.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match QuireConfig::load() {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(e) => (QuireConfig::default(), Some(e)),
    };

    let level = cli.log_level.as_deref().or(config.log.level.as_deref());
    init_tracing(level, cli.stderr_log || config.log.stderr);

    if let Some(e) = config_error {
        let path = e.path().to_path_buf();
        tracing::warn!(path = %path.display(), "Using default config: {:#}", anyhow::Error::new(e));
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting quire");

    let exit_code = serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.session,
        Arc::new(LocalProjectFactory),
    )
    .await
    .context("language server session failed")?;

    tracing::info!(exit_code, "Stopped");
    std::process::exit(exit_code);
}
