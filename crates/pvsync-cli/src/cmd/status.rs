//! Status subcommand - progress of a project against its config

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pvsync_store::Database;

use super::{ProjectArgs, print_table, source_for};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Estimate against a local mirror directory instead of base_url
    #[arg(long)]
    pub mirror: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let (_, snapshot) = args.project.load()?;
    let db_path = args.project.database(config)?;
    let db = Database::open(&db_path)?;
    let source = source_for(&snapshot, args.mirror.as_deref());

    let horizon = chrono::Utc::now().naive_utc();
    let status = pvsync_core::status(&snapshot, source.as_ref(), &db, horizon)?;
    eprintln!("{}", status.format_table());

    let failures = db.outstanding_failures()?;
    if !failures.is_empty() {
        let rows: Vec<(&str, String)> = failures
            .iter()
            .map(|(kind, n)| (kind.as_str(), n.to_string()))
            .collect();
        print_table("Failed files (retried next sync)", &rows);
    }

    let pending = db.pending_files()?;
    if !pending.is_empty() {
        log::warn!(
            "{} file(s) partially committed by an interrupted sync; the next sync rolls them back",
            pending.len()
        );
    }
    Ok(())
}
