//! pvsync - incremental sync of Wikimedia hourly pageview dumps
//!
//! Streams hourly dump files, filters and samples them, and aggregates
//! the surviving rows into one DuckDB database per project.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "pvsync")]
#[command(about = "Incremental sync of Wikimedia hourly pageview dumps into DuckDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./pvsync.toml or ~/.config/pvsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Download, filter, and aggregate pending dump files
    Sync(cmd::sync::SyncArgs),
    /// Show sync progress of a project
    Status(cmd::status::StatusArgs),
    /// Reclaim space in a project database
    Compact(cmd::ProjectArgs),
    /// Show global settings, or a project's validated config and history
    Config(cmd::config::ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(pvsync_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  - progress bars show activity
    //   non-TTY: info unless --debug          - logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    pvsync_core::init_logging(quiet, cli.debug, multi);

    match run(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, progress: &pvsync_core::SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // Apply HTTP settings (config file defaults, CLI overrides)
    pvsync_core::set_http_config(pvsync_core::HttpConfig {
        read_timeout: std::time::Duration::from_secs(
            cli.read_timeout.unwrap_or(config.http.read_timeout),
        ),
        connect_timeout: std::time::Duration::from_secs(
            cli.connect_timeout.unwrap_or(config.http.connect_timeout),
        ),
    });

    match cli.command {
        Command::Sync(args) => cmd::sync::run(args, &config, progress),
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Compact(args) => cmd::compact::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config(args) => cmd::config::run(args, &config).map(|()| ExitCode::SUCCESS),
    }
}
