//! Global tool configuration from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for pvsync (not per project)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data: DataConfig,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Where project databases live, as `{dir}/{project}.duckdb`
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("", "", "pvsync")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self { dir }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Seconds without data before a download is considered stalled
    pub read_timeout: u64,
    pub connect_timeout: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            read_timeout: 30,
            connect_timeout: 30,
        }
    }
}

impl Config {
    /// Files consulted by `load`, first match wins: `./pvsync.toml`,
    /// then the per-user `config.toml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("pvsync.toml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "pvsync") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    /// Load the first config file found, or defaults when there is none.
    pub fn load() -> Result<Self> {
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Database path for a project file: `{data.dir}/{file stem}.duckdb`
    pub fn database_for(&self, project: &Path) -> Result<PathBuf> {
        let stem = project
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .with_context(|| format!("Cannot derive a project name from {}", project.display()))?;
        Ok(self.data.dir.join(format!("{stem}.duckdb")))
    }
}
