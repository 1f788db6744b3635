//! Config subcommand - global settings, or a project's snapshot and history

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pvsync_core::{ConfigSnapshot, FilterSet};
use pvsync_store::Database;

use super::{ProjectArgs, print_table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Project config file; omit to show global settings
    pub project: Option<PathBuf>,

    /// Database path (default: {data.dir}/{project}.duckdb)
    #[arg(long, requires = "project")]
    pub db: Option<PathBuf>,
}

pub fn run(args: ConfigArgs, config: &Config) -> Result<()> {
    let Some(project) = args.project else {
        print_table(
            "Setting",
            &[
                ("Data directory", config.data.dir.display().to_string()),
                ("Read timeout", format!("{}s", config.http.read_timeout)),
                ("Connect timeout", format!("{}s", config.http.connect_timeout)),
            ],
        );
        return Ok(());
    };

    let project = ProjectArgs {
        project,
        db: args.db,
    };
    let (project_config, snapshot) = project.load()?;
    let mut rows = snapshot_rows(&snapshot);
    rows.push(("Chunk size", project_config.chunk_size()?.to_string()));
    print_table("Project", &rows);

    let db_path = project.database(config)?;
    if db_path.is_file() {
        let db = Database::open(&db_path)?;
        print_history(&db, &snapshot)?;
    } else {
        log::info!("No database yet at {}", db_path.display());
    }
    Ok(())
}

fn list(items: &Option<Vec<String>>) -> String {
    items.as_ref().map_or_else(|| "-".to_string(), |v| v.join(", "))
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), T::to_string)
}

fn filter_rows(filters: &FilterSet) -> Vec<(&'static str, String)> {
    vec![
        ("Line pattern", opt(&filters.line_pattern)),
        ("Title pattern", opt(&filters.title_pattern)),
        ("Domain codes", list(&filters.domain_codes)),
        ("Min views", opt(&filters.min_views)),
        ("Max views", opt(&filters.max_views)),
        ("Languages", list(&filters.languages)),
        ("Domains", list(&filters.domains)),
        ("Mobile", opt(&filters.mobile)),
    ]
}

fn snapshot_rows(snapshot: &ConfigSnapshot) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Base URL", snapshot.base_url.clone()),
        ("Politeness delay", format!("{}s", snapshot.politeness_delay)),
        ("Date range", snapshot.range.to_string()),
        ("Sample rate", snapshot.sample_rate.to_string()),
    ];
    rows.extend(filter_rows(&snapshot.filters));
    rows
}

fn print_history(db: &Database, current: &ConfigSnapshot) -> Result<()> {
    let history = db.snapshot_history()?;
    if history.is_empty() {
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Recorded").fg(Color::Cyan),
            Cell::new("Hash").fg(Color::Cyan),
            Cell::new("Date range").fg(Color::Cyan),
            Cell::new("Sample rate").fg(Color::Cyan),
        ]);
    for record in &history {
        let hash = record.input_hash.get(..8).unwrap_or(&record.input_hash);
        let mut row = vec![
            Cell::new(record.id),
            Cell::new(&record.recorded_at),
            Cell::new(hash),
            Cell::new(record.snapshot.range.to_string()),
            Cell::new(record.snapshot.sample_rate),
        ];
        if record.snapshot == *current {
            row = row.into_iter().map(|c| c.fg(Color::Green)).collect();
        }
        table.add_row(row);
    }
    eprintln!("\n{table}");
    Ok(())
}
