//! Project configuration loading from TOML files

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::error::SyncError;
use crate::snapshot::{ConfigSnapshot, DEFAULT_BASE_URL, FilterSet};
use crate::types::DateRange;

/// Environment variable overriding the chunk size bound
pub const CHUNK_SIZE_ENV: &str = "PVSYNC_CHUNK_SIZE";

/// Raw project file, as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_politeness_delay", alias = "sleep_time")]
    pub politeness_delay: f64,
    pub start_date: DateValue,
    #[serde(default)]
    pub end_date: Option<DateValue>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub filters: RawFilters,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_politeness_delay() -> f64 {
    5.0
}

fn default_sample_rate() -> f64 {
    1.0
}

/// A date given either as a bare TOML date or as a `YYYY-MM-DD` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Toml(toml::value::Datetime),
    Text(String),
}

impl DateValue {
    /// `Ok(None)` for an empty string.
    fn resolve(&self, field: &'static str) -> Result<Option<NaiveDate>, SyncError> {
        match self {
            Self::Text(s) if s.trim().is_empty() => Ok(None),
            Self::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|e| SyncError::config(field, format!("{s:?}: {e}"))),
            Self::Toml(dt) => {
                let date = dt
                    .date
                    .ok_or_else(|| SyncError::config(field, format!("{dt} has no date part")))?;
                NaiveDate::from_ymd_opt(
                    i32::from(date.year),
                    u32::from(date.month),
                    u32::from(date.day),
                )
                .map(Some)
                .ok_or_else(|| SyncError::config(field, format!("{dt} is not a valid date")))
            }
        }
    }
}

/// `[filters]` table with the historical key names accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawFilters {
    #[serde(alias = "line_regex")]
    pub line_pattern: Option<String>,
    #[serde(alias = "page_title")]
    pub title_pattern: Option<String>,
    pub domain_codes: Option<Vec<String>>,
    pub min_views: Option<u64>,
    pub max_views: Option<u64>,
    pub languages: Option<Vec<String>>,
    pub domains: Option<Vec<String>>,
    pub mobile: Option<bool>,
}

impl From<RawFilters> for FilterSet {
    fn from(raw: RawFilters) -> Self {
        FilterSet {
            line_pattern: raw.line_pattern,
            title_pattern: raw.title_pattern,
            domain_codes: raw.domain_codes,
            min_views: raw.min_views,
            max_views: raw.max_views,
            languages: raw.languages,
            domains: raw.domains,
            mobile: raw.mobile,
        }
    }
}

impl ProjectConfig {
    /// Load a project file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse project config: {}", path.display()))?;
        log::debug!("Loaded project config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate into an immutable snapshot.
    pub fn snapshot(&self) -> Result<ConfigSnapshot, SyncError> {
        let start = self
            .start_date
            .resolve("start_date")?
            .ok_or_else(|| SyncError::config("start_date", "must not be empty"))?;
        let end = match &self.end_date {
            Some(v) => v.resolve("end_date")?,
            None => None,
        };
        ConfigSnapshot::new(
            self.base_url.clone(),
            self.politeness_delay,
            DateRange::new(start, end),
            self.sample_rate,
            self.filters.clone().into(),
        )
    }

    /// Chunk bound from `PVSYNC_CHUNK_SIZE`, else the project file, else the default.
    pub fn chunk_size(&self) -> Result<usize, SyncError> {
        let env = std::env::var(CHUNK_SIZE_ENV).ok();
        resolve_chunk_size(env.as_deref(), self.chunk_size)
    }
}

/// Chunk size precedence: environment > configured > default.
pub fn resolve_chunk_size(env: Option<&str>, configured: Option<usize>) -> Result<usize, SyncError> {
    let size = match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            SyncError::config("chunk_size", format!("{CHUNK_SIZE_ENV}={raw:?} is not a number"))
        })?,
        None => configured.unwrap_or(DEFAULT_CHUNK_SIZE),
    };
    if size == 0 {
        return Err(SyncError::config("chunk_size", "must be at least 1"));
    }
    Ok(size)
}
