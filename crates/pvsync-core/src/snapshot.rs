//! Validated, immutable description of sync intent

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::guard;
use crate::types::DateRange;

/// Official dump mirror.
pub const DEFAULT_BASE_URL: &str = "https://dumps.wikimedia.org/";

/// Longest accepted delay between downloads (one day)
pub const MAX_POLITENESS_DELAY: f64 = 86_400.0;

/// Row filters. `None` on any dimension means "accept all".
///
/// Always held in normalized form (see [`FilterSet::normalized`]) so that
/// two snapshots with the same intent compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Regex searched in each raw line before parsing.
    pub line_pattern: Option<String>,
    /// Regex searched in the parsed page title.
    pub title_pattern: Option<String>,
    pub domain_codes: Option<Vec<String>>,
    pub min_views: Option<u64>,
    pub max_views: Option<u64>,
    pub languages: Option<Vec<String>>,
    pub domains: Option<Vec<String>>,
    /// `Some(true)` keeps mobile rows only, `Some(false)` desktop only.
    pub mobile: Option<bool>,
}

fn blank_to_none(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn normalize_list(list: Option<Vec<String>>) -> Option<Vec<String>> {
    let mut items: Vec<String> = list?
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    items.sort_unstable();
    items.dedup();
    (!items.is_empty()).then_some(items)
}

impl FilterSet {
    /// Blank strings and empty lists become `None`; lists are sorted and deduplicated.
    pub fn normalized(self) -> Self {
        Self {
            line_pattern: blank_to_none(self.line_pattern),
            title_pattern: blank_to_none(self.title_pattern),
            domain_codes: normalize_list(self.domain_codes),
            min_views: self.min_views,
            max_views: self.max_views,
            languages: normalize_list(self.languages),
            domains: normalize_list(self.domains),
            mobile: self.mobile,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if let Some(p) = &self.line_pattern {
            Regex::new(p).map_err(|e| SyncError::config("filters.line_pattern", e.to_string()))?;
        }
        if let Some(p) = &self.title_pattern {
            Regex::new(p).map_err(|e| SyncError::config("filters.title_pattern", e.to_string()))?;
        }
        if let (Some(min), Some(max)) = (self.min_views, self.max_views) {
            if min > max {
                return Err(SyncError::config(
                    "filters.min_views",
                    format!("min_views ({min}) exceeds max_views ({max})"),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable per-run configuration.
///
/// Only constructed through [`ConfigSnapshot::new`], which validates and
/// normalizes every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub base_url: String,
    /// Seconds to wait between file fetches.
    pub politeness_delay: f64,
    pub range: DateRange,
    pub sample_rate: f64,
    pub filters: FilterSet,
}

impl ConfigSnapshot {
    pub fn new(
        base_url: impl Into<String>,
        politeness_delay: f64,
        range: DateRange,
        sample_rate: f64,
        filters: FilterSet,
    ) -> Result<Self, SyncError> {
        let base_url = normalize_base_url(base_url.into())?;

        if !politeness_delay.is_finite() || politeness_delay < 0.0 {
            return Err(SyncError::config(
                "politeness_delay",
                format!("must be a non-negative number of seconds, got {politeness_delay}"),
            ));
        }
        if politeness_delay > MAX_POLITENESS_DELAY {
            return Err(SyncError::config(
                "politeness_delay",
                format!("must be at most {MAX_POLITENESS_DELAY}s, got {politeness_delay}"),
            ));
        }
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(SyncError::config(
                "sample_rate",
                format!("must be within [0, 1], got {sample_rate}"),
            ));
        }
        if let Some(end) = range.end {
            if end < range.start {
                return Err(SyncError::config(
                    "end_date",
                    format!("{end} is before start_date {}", range.start),
                ));
            }
        }

        let filters = filters.normalized();
        filters.validate()?;

        Ok(Self {
            base_url,
            politeness_delay,
            range,
            sample_rate,
            filters,
        })
    }

    /// Whether moving from `previous` to `self` only widens scope.
    pub fn is_compatible_successor(&self, previous: &ConfigSnapshot) -> bool {
        guard::check(previous, self).is_ok()
    }

    pub fn politeness(&self) -> Duration {
        Duration::try_from_secs_f64(self.politeness_delay)
            .unwrap_or(Duration::from_secs_f64(MAX_POLITENESS_DELAY))
    }
}

fn normalize_base_url(url: String) -> Result<String, SyncError> {
    let url = url.trim().to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SyncError::config(
            "base_url",
            format!("expected an http(s) URL, got {url:?}"),
        ));
    }
    if url.ends_with('/') {
        Ok(url)
    } else {
        Ok(format!("{url}/"))
    }
}
