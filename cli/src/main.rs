//! Outpost CLI - binary entry point.
//!
//! ```text
//! agent host --(JSON lines on stdin)--> outpost serve --> Bridge --> ssh / sh
//!            <-(JSON lines on stdout)--
//! ```
//!
//! stdout carries the protocol, so logs go to `~/.outpost/logs/outpost.log`
//! (or stderr when no log file can be opened).

mod remote;
mod server;

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use outpost_config::OutpostConfig;
use outpost_tools::ToolRegistry;
use outpost_tools::builtins::register_builtins;

#[derive(Debug, Parser)]
#[command(name = "outpost", version, about = "Proxy agent tool calls to a remote workspace")]
struct Cli {
    /// Config file (default: ~/.outpost/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve a local directory through `sh` instead of connecting over ssh.
    #[arg(long, global = true, value_name = "DIR")]
    local: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Answer tool calls as newline-delimited JSON on stdin/stdout (default).
    Serve,
    /// Print the tool definitions as JSON and exit.
    Tools,
}

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
        .with(fmt::layer().with_writer(std::io::stderr))
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

    // Primary: ~/.outpost/logs/outpost.log
    if let Some(dir) = outpost_config::outpost_dir() {
        candidates.push(dir.join("logs").join("outpost.log"));
    }

    candidates.push(PathBuf::from(".outpost").join("logs").join("outpost.log"));

    candidates
}

fn load_config(explicit: Option<&Path>) -> Result<OutpostConfig> {
    let config = match explicit {
        Some(path) => OutpostConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => OutpostConfig::load()
            .context("loading ~/.outpost/config.toml")?
            .unwrap_or_default(),
    };
    Ok(config)
}

fn print_tools() -> Result<()> {
    let mut registry = ToolRegistry::default();
    register_builtins(&mut registry)?;
    let json = serde_json::to_string_pretty(&registry.definitions())?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Tools => print_tools(),
        Command::Serve => {
            let config = load_config(cli.config.as_deref())?;
            let connection = remote::connect(&config, cli.local.as_deref())?;
            tracing::info!(
                workspace = %connection.bridge.resolver().workspace_root(),
                "outpost serving on stdin/stdout"
            );
            let bridge = Arc::new(connection.bridge);
            server::serve(
                Arc::clone(&bridge),
                Some(connection.updates),
                tokio::io::stdin(),
                tokio::io::stdout(),
            )
            .await?;
            bridge.clear_state();
            tracing::info!("stdin closed; shutting down");
            Ok(())
        }
    }
}
