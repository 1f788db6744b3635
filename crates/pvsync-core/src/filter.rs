//! Two-stage row filtering
//!
//! Stage 1 runs on raw text lines before parsing and discards the bulk of
//! non-matching input cheaply. Stage 2 runs on parsed rows. Every predicate
//! is AND-combined; an absent filter accepts everything.

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::SyncError;
use crate::snapshot::FilterSet;
use crate::types::Row;

/// Compiled form of a [`FilterSet`].
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    line_regex: Option<Regex>,
    title_regex: Option<Regex>,
    domain_codes: Option<FxHashSet<String>>,
    /// Pre-computed `"{code} "` prefixes for the line stage.
    code_prefixes: Vec<String>,
    min_views: Option<u64>,
    max_views: Option<u64>,
    languages: Option<FxHashSet<String>>,
    domains: Option<FxHashSet<String>>,
    mobile: Option<bool>,
}

fn compile(field: &'static str, pattern: Option<&String>) -> Result<Option<Regex>, SyncError> {
    pattern
        .map(|p| Regex::new(p).map_err(|e| SyncError::config(field, e.to_string())))
        .transpose()
}

fn to_set(list: Option<&Vec<String>>) -> Option<FxHashSet<String>> {
    list.map(|items| items.iter().cloned().collect())
}

impl FilterPipeline {
    pub fn new(filters: &FilterSet) -> Result<Self, SyncError> {
        let code_prefixes = filters
            .domain_codes
            .iter()
            .flatten()
            .map(|c| format!("{c} "))
            .collect();
        Ok(Self {
            line_regex: compile("filters.line_pattern", filters.line_pattern.as_ref())?,
            title_regex: compile("filters.title_pattern", filters.title_pattern.as_ref())?,
            domain_codes: to_set(filters.domain_codes.as_ref()),
            code_prefixes,
            min_views: filters.min_views,
            max_views: filters.max_views,
            languages: to_set(filters.languages.as_ref()),
            domains: to_set(filters.domains.as_ref()),
            mobile: filters.mobile,
        })
    }

    /// Stage 1: whether a raw line might produce an accepted row.
    ///
    /// Lines start with their domain code, so a domain-code filter is
    /// checked here as a prefix match before the line regex.
    pub fn accept_line(&self, line: &str) -> bool {
        if !self.code_prefixes.is_empty()
            && !self.code_prefixes.iter().any(|p| line.starts_with(p.as_str()))
        {
            return false;
        }
        self.line_regex.as_ref().is_none_or(|re| re.is_match(line))
    }

    /// Stage 2: full predicate on a parsed row.
    pub fn accept_row(&self, row: &Row) -> bool {
        if let Some(min) = self.min_views {
            if row.views < min {
                return false;
            }
        }
        if let Some(max) = self.max_views {
            if row.views > max {
                return false;
            }
        }
        if let Some(mobile) = self.mobile {
            if row.mobile != mobile {
                return false;
            }
        }
        if let Some(codes) = &self.domain_codes {
            if !codes.contains(&row.domain_code) {
                return false;
            }
        }
        if let Some(langs) = &self.languages {
            if !langs.contains(&row.language) {
                return false;
            }
        }
        if let Some(domains) = &self.domains {
            if !domains.contains(&row.domain) {
                return false;
            }
        }
        self.title_regex
            .as_ref()
            .is_none_or(|re| re.is_match(&row.page_title))
    }
}
