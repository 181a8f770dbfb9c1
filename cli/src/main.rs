//! `saga-lsp`: the language server binary.
//!
//! Speaks the protocol over stdin/stdout. Stdout carries only protocol
//! frames, so logs go to `~/.saga/logs/saga-lsp.log` (or
//! `./.saga/logs/saga-lsp.log`), falling back to stderr.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use saga_config::SagaConfig;
use saga_lsp::ServerOptions;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

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

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
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

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
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

    if let Some(config_path) = SagaConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("saga-lsp.log"));
    }

    candidates.push(PathBuf::from(".saga").join("logs").join("saga-lsp.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    if std::env::args().skip(1).any(|arg| arg == "--version" || arg == "-V") {
        println!("saga-lsp {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing();

    let config = match SagaConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            tracing::warn!("Using default settings: {err}");
            SagaConfig::default()
        }
    };

    let options = ServerOptions {
        settings: config.server,
        ..ServerOptions::default()
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting saga-lsp");
    let end = saga_lsp::serve(tokio::io::stdin(), tokio::io::stdout(), options)
        .await
        .context("language server session failed")?;

    tracing::info!(clean = end.clean, "Session ended");
    Ok(if end.clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
