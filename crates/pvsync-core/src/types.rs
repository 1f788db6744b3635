//! File identities and rows flowing through the sync pipeline

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Partition key of the hourly pageview dumps.
pub const PAGEVIEWS_PARTITION: &str = "pageviews";

/// Addressable unit of remote data: one hourly dump file.
///
/// Field order gives the derived `Ord` its chronological meaning
/// (date, then hour, then partition).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub date: NaiveDate,
    pub hour: u8,
    pub partition: String,
}

impl FileIdentity {
    pub fn new(date: NaiveDate, hour: u8, partition: impl Into<String>) -> Self {
        debug_assert!(hour < 24, "hour out of range: {hour}");
        Self {
            date,
            hour,
            partition: partition.into(),
        }
    }

    /// Hourly pageview dump identity.
    pub fn pageviews(date: NaiveDate, hour: u8) -> Self {
        Self::new(date, hour, PAGEVIEWS_PARTITION)
    }

    /// Stable text key, used for hashing and as the durable progress key.
    ///
    /// Format: `pageviews/2024-01-01T05`
    pub fn key(&self) -> String {
        format!("{}/{}T{:02}", self.partition, self.date, self.hour)
    }

    /// Start of the hour this file covers.
    pub fn timestamp(&self) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(u32::from(self.hour), 0, 0).unwrap_or(NaiveTime::MIN);
        self.date.and_time(time)
    }

    /// Whether this file's hour starts after `horizon` (floored to the hour).
    pub fn is_after(&self, horizon: NaiveDateTime) -> bool {
        let floored = horizon
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(horizon);
        self.timestamp() > floored
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:02}0000",
            self.partition,
            self.date.format("%Y%m%d"),
            self.hour
        )
    }
}

/// Inclusive date range; `end = None` means "up to now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Whether `self` covers every date `other` covers.
    ///
    /// An open end is treated as unbounded, so a bounded range never
    /// contains an open-ended one.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        if self.start > other.start {
            return false;
        }
        match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine >= theirs,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.is_none_or(|end| date <= end)
    }

    /// Iterate every date in the range, capping an open end at `today`.
    pub fn days(&self, today: NaiveDate) -> impl Iterator<Item = NaiveDate> {
        let last = self.end.map_or(today, |end| end.min(today));
        self.start.iter_days().take_while(move |d| *d <= last)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}..={}", self.start, end),
            None => write!(f, "{}..", self.start),
        }
    }
}

/// One aggregated pageview row, produced by a parser from a single dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub date: NaiveDate,
    pub hour: u8,
    pub domain_code: String,
    pub language: String,
    pub domain: String,
    pub page_title: String,
    pub mobile: bool,
    pub views: u64,
    pub bytes: u64,
}
