//! Consistency guard: only scope-widening config changes once data is committed

use std::fmt;

use crate::error::SyncError;
use crate::snapshot::ConfigSnapshot;
use crate::store::{ProgressStore, SnapshotStore};
use crate::types::DateRange;

/// Why a candidate snapshot cannot follow the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    DateRangeNarrowed {
        previous: DateRange,
        candidate: DateRange,
    },
    SampleRateDecreased {
        previous: f64,
        candidate: f64,
    },
    FiltersChanged,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DateRangeNarrowed { .. } => "date_range_narrowed",
            Self::SampleRateDecreased { .. } => "sample_rate_decreased",
            Self::FiltersChanged => "filters_changed",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateRangeNarrowed {
                previous,
                candidate,
            } => write!(
                f,
                "{}: {candidate} does not cover committed range {previous}",
                self.reason()
            ),
            Self::SampleRateDecreased {
                previous,
                candidate,
            } => write!(f, "{}: {previous} -> {candidate}", self.reason()),
            Self::FiltersChanged => write!(
                f,
                "{}: filters cannot change once data has been synced",
                self.reason()
            ),
        }
    }
}

impl std::error::Error for Rejection {}

/// Compatible-successor relation. Returns the first violation found.
pub fn check(previous: &ConfigSnapshot, candidate: &ConfigSnapshot) -> Result<(), Rejection> {
    if !candidate.range.contains_range(&previous.range) {
        return Err(Rejection::DateRangeNarrowed {
            previous: previous.range,
            candidate: candidate.range,
        });
    }
    if candidate.sample_rate < previous.sample_rate {
        return Err(Rejection::SampleRateDecreased {
            previous: previous.sample_rate,
            candidate: candidate.sample_rate,
        });
    }
    if candidate.filters != previous.filters {
        return Err(Rejection::FiltersChanged);
    }
    Ok(())
}

/// Pure authorization decision.
pub fn authorize(
    previous: Option<&ConfigSnapshot>,
    candidate: &ConfigSnapshot,
    has_committed_any: bool,
) -> Result<(), Rejection> {
    match previous {
        Some(previous) if has_committed_any => check(previous, candidate),
        _ => Ok(()),
    }
}

/// Authorize `candidate` against stored history and record it on success.
pub fn check_and_record<S>(store: &mut S, candidate: &ConfigSnapshot) -> Result<(), SyncError>
where
    S: ProgressStore + SnapshotStore + ?Sized,
{
    let previous = store
        .latest_snapshot()
        .map_err(|e| SyncError::store("failed to load config snapshot", e))?;
    let committed = store
        .has_committed_any()
        .map_err(|e| SyncError::store("failed to read progress", e))?;

    if committed && previous.is_none() {
        log::warn!("Progress exists without a recorded config snapshot; accepting current config");
    }
    authorize(previous.as_ref(), candidate, committed)?;

    if previous.as_ref() != Some(candidate) {
        store
            .record_snapshot(candidate)
            .map_err(|e| SyncError::store("failed to record config snapshot", e))?;
        log::debug!("Recorded new config snapshot");
    }
    Ok(())
}
