//! Subcommands

pub mod compact;
pub mod config;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pvsync_core::{ConfigSnapshot, ProjectConfig, RemoteSource};
use pvsync_wikimedia::{LocalMirror, WikimediaSource};

use crate::config::Config;

/// A project file and where its database lives.
#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Project config file (TOML)
    pub project: PathBuf,

    /// Database path (default: {data.dir}/{project}.duckdb)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl ProjectArgs {
    pub fn database(&self, config: &Config) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => config.database_for(&self.project),
        }
    }

    /// Load and validate the project file.
    pub fn load(&self) -> Result<(ProjectConfig, ConfigSnapshot)> {
        let project = ProjectConfig::from_file(&self.project)?;
        let snapshot = project
            .snapshot()
            .with_context(|| format!("Invalid project config: {}", self.project.display()))?;
        Ok((project, snapshot))
    }
}

/// Remote source for a project: a local mirror directory if given, else HTTP.
pub fn source_for(snapshot: &ConfigSnapshot, mirror: Option<&Path>) -> Box<dyn RemoteSource> {
    match mirror {
        Some(dir) => {
            log::info!("Reading dumps from local mirror {}", dir.display());
            Box::new(LocalMirror::new(dir))
        }
        None => Box::new(WikimediaSource::new(snapshot.base_url.clone())),
    }
}

/// Print a key-value table on stderr
pub fn print_table(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
