//! Compact subcommand - VACUUM + CHECKPOINT a project database

use anyhow::Result;
use pvsync_core::AggregationSink;
use pvsync_core::progress::fmt_num;
use pvsync_store::{Database, SyncLock};

use super::{ProjectArgs, print_table};
use crate::config::Config;

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn run(args: ProjectArgs, config: &Config) -> Result<()> {
    let db_path = args.database(config)?;
    let _lock = SyncLock::acquire(&db_path)?;
    let before = file_size(&db_path);
    {
        let mut db = Database::open(&db_path)?;
        db.compact()?;
    }
    let after = file_size(&db_path);

    print_table(
        "Compacted",
        &[
            ("Database", db_path.display().to_string()),
            ("Before", format!("{} bytes", fmt_num(before as usize))),
            ("After", format!("{} bytes", fmt_num(after as usize))),
        ],
    );
    Ok(())
}
