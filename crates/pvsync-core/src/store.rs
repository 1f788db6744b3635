//! Persistence seams: aggregation sink, progress record, snapshot history
//!
//! A single backend usually implements all three so that a chunk's rows and
//! its progress update share one transaction.

use anyhow::Result;

use crate::chunk::FileSpan;
use crate::error::FailureKind;
use crate::snapshot::ConfigSnapshot;
use crate::types::{DateRange, FileIdentity, Row};

/// One atomic unit of work handed to the sink.
#[derive(Debug, Clone, Copy)]
pub struct ChunkCommit<'a> {
    pub rows: &'a [Row],
    /// Which file each run of `rows` came from, in order.
    pub spans: &'a [FileSpan],
    /// Files fully consumed; marked done in the same transaction as `rows`.
    pub completed: &'a [FileIdentity],
}

impl ChunkCommit<'_> {
    /// Files with rows in this commit that are not yet complete.
    pub fn pending(&self) -> impl Iterator<Item = &FileIdentity> {
        self.spans
            .iter()
            .map(|s| &s.file)
            .filter(|f| !self.completed.contains(f))
    }

    /// Every file this commit touches, for error reporting.
    pub fn files(&self) -> Vec<FileIdentity> {
        let mut files: Vec<FileIdentity> = self.spans.iter().map(|s| s.file.clone()).collect();
        for f in self.completed {
            if !files.contains(f) {
                files.push(f.clone());
            }
        }
        files
    }
}

pub trait AggregationSink {
    /// Durably apply a chunk: rows, pending markers for partially consumed
    /// files, and done marks for `completed`, all in one transaction.
    fn append(&mut self, commit: &ChunkCommit<'_>) -> Result<()>;

    /// Remove every row and the pending marker of a partially committed file.
    fn discard(&mut self, file: &FileIdentity) -> Result<()>;

    /// Roll back all pending files (left behind by a crash). Returns them.
    fn discard_pending(&mut self) -> Result<Vec<FileIdentity>>;

    /// Reclaim space after many small appends.
    fn compact(&mut self) -> Result<()>;

    fn row_count_for(&self, range: &DateRange) -> Result<u64>;
}

pub trait ProgressStore {
    fn is_done(&self, file: &FileIdentity) -> Result<bool>;

    fn done_files(&self) -> Result<Vec<FileIdentity>>;

    /// Mark files done without rows (their rows were already committed).
    fn mark_done(&mut self, files: &[FileIdentity]) -> Result<()>;

    fn has_committed_any(&self) -> Result<bool> {
        Ok(!self.done_files()?.is_empty())
    }

    /// Append to the failure ledger. Informational only, never progress.
    fn record_failure(&mut self, file: &FileIdentity, kind: FailureKind, message: &str)
    -> Result<()>;
}

pub trait SnapshotStore {
    fn latest_snapshot(&self) -> Result<Option<ConfigSnapshot>>;

    /// Append `snapshot` to the history, making it the latest.
    fn record_snapshot(&mut self, snapshot: &ConfigSnapshot) -> Result<()>;
}

/// Everything the engine needs from a backend.
pub trait SyncStore: AggregationSink + ProgressStore + SnapshotStore {}

impl<T: AggregationSink + ProgressStore + SnapshotStore + ?Sized> SyncStore for T {}
