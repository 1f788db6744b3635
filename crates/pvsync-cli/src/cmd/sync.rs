//! Sync subcommand - fetch pending dump files into the project database

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Args;
use pvsync_core::{CancelFlag, SharedProgress, StopReason, SyncEngine, SyncOptions};
use pvsync_store::{Database, SyncLock};
use pvsync_wikimedia::PageviewParser;

use super::{ProjectArgs, print_table, source_for};
use crate::config::Config;

/// Exit status after an interrupted sync
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Read dumps from a local mirror directory instead of base_url
    #[arg(long)]
    pub mirror: Option<PathBuf>,

    /// Stop after attempting this many files
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

pub fn run(args: SyncArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let (project, snapshot) = args.project.load()?;
    let chunk_size = project.chunk_size()?;
    let db_path = args.project.database(config)?;

    let _lock = SyncLock::acquire(&db_path)?;
    let mut db = Database::open_or_create(&db_path)?;
    let source = source_for(&snapshot, args.mirror.as_deref());

    let cancel = CancelFlag::new();
    setup_signal_handler(&cancel)?;

    log::info!(
        "Syncing {} into {} ({}, sample rate {})",
        args.project.project.display(),
        db_path.display(),
        snapshot.range,
        snapshot.sample_rate
    );
    let options = SyncOptions::new(&snapshot)
        .with_chunk_size(chunk_size)
        .with_max_files(args.limit);

    let summary = SyncEngine::new(
        &snapshot,
        source.as_ref(),
        &PageviewParser,
        &mut db,
        options,
        cancel,
    )?
    .with_progress(progress.clone())
    .run()?;

    if progress.is_tty() {
        eprintln!("{}", summary.format_table());
    } else {
        summary.log();
    }

    match summary.stop {
        StopReason::Cancelled => {
            print_table(
                "Interrupted",
                &[
                    ("Database", db_path.display().to_string()),
                    ("Resume", "run the same command again".to_string()),
                ],
            );
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        StopReason::Exhausted | StopReason::Limited => Ok(ExitCode::SUCCESS),
    }
}

/// First signal requests a graceful stop; a second one exits immediately.
fn setup_signal_handler(cancel: &CancelFlag) -> Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let flag = cancel.as_arc();
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if flag.swap(true, Ordering::Relaxed) {
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}
