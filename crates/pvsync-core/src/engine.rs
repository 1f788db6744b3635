//! Incremental sync engine
//!
//! Drives one sync run: roll back leftovers of an interrupted run, authorize
//! the config snapshot, plan a chronological work queue, then fetch, filter,
//! and commit files in bounded chunks until the queue is exhausted, the file
//! budget is spent, or cancellation is requested.
//!
//! Progress and rows move together: a file is marked done in the same
//! transaction as its last rows. A file whose rows straddle a chunk boundary
//! is committed as *pending* and rolled back if it does not finish.

use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::chunk::{Chunk, DEFAULT_CHUNK_SIZE};
use crate::error::{FileError, SyncError};
use crate::filter::FilterPipeline;
use crate::guard;
use crate::progress::{SharedProgress, fmt_num};
use crate::sampler;
use crate::shutdown::CancelFlag;
use crate::snapshot::ConfigSnapshot;
use crate::source::{RawFile, RemoteSource, RowParser};
use crate::store::SyncStore;
use crate::summary::{RunSummary, StopReason};
use crate::types::FileIdentity;
use crate::work_queue::WorkQueue;

/// Runtime knobs that are not part of the config snapshot.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum rows held in memory before a commit
    pub chunk_size: usize,
    /// Stop after attempting this many files
    pub max_files: Option<usize>,
    /// Pause between consecutive fetches
    pub politeness_delay: Duration,
    /// Planning "now"; files for later hours are not planned
    pub horizon: NaiveDateTime,
}

impl SyncOptions {
    pub fn new(snapshot: &ConfigSnapshot) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_files: None,
            politeness_delay: snapshot.politeness(),
            horizon: Utc::now().naive_utc(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    pub fn with_horizon(mut self, horizon: NaiveDateTime) -> Self {
        self.horizon = horizon;
        self
    }
}

/// Engine state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Planning,
    Fetching(FileIdentity),
    Parsing(FileIdentity),
    Accumulating,
    Committing,
    Exhausted,
    Limited,
    Cancelled,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Limited | Self::Cancelled)
    }
}

fn enter(state: &mut SyncState, next: SyncState) {
    log::trace!("{state:?} -> {next:?}");
    *state = next;
}

enum FileOutcome {
    Done,
    Failed(FileError),
    Cancelled,
}

/// Chunk plus the bookkeeping that must stay consistent with the store.
struct Committer<'a, S: ?Sized> {
    store: &'a mut S,
    chunk: Chunk,
    /// Files with rows already committed but not yet marked done
    partial: FxHashSet<FileIdentity>,
    commits: usize,
    rows_committed: u64,
    files_completed: usize,
}

impl<S: SyncStore + ?Sized> Committer<'_, S> {
    /// Commit the current chunk, if there is anything to commit.
    fn flush(&mut self) -> Result<(), SyncError> {
        if self.chunk.is_idle() {
            return Ok(());
        }
        let commit = self.chunk.as_commit();
        let result = if commit.rows.is_empty() {
            self.store.mark_done(commit.completed)
        } else {
            self.store.append(&commit)
        };
        result.map_err(|source| SyncError::SinkCommitFailed {
            files: commit.files(),
            source,
        })?;

        for file in commit.pending() {
            self.partial.insert(file.clone());
        }
        for file in commit.completed {
            self.partial.remove(file);
        }
        if !commit.rows.is_empty() {
            self.commits += 1;
            self.rows_committed += commit.rows.len() as u64;
        }
        self.files_completed += commit.completed.len();
        log::info!(
            "Committed {} rows, {} files complete",
            fmt_num(commit.rows.len()),
            commit.completed.len()
        );

        self.chunk.clear();
        Ok(())
    }

    /// Remove every trace of an unfinished file. Returns whether the store was touched.
    fn roll_back(&mut self, file: &FileIdentity) -> Result<bool, SyncError> {
        self.chunk.truncate_file(file);
        if !self.partial.remove(file) {
            return Ok(false);
        }
        self.store
            .discard(file)
            .map_err(|e| SyncError::store(format!("failed to roll back {file}"), e))?;
        log::info!("Rolled back partially committed {file}");
        Ok(true)
    }
}

pub struct SyncEngine<'a, Src: ?Sized, P, S: ?Sized> {
    snapshot: &'a ConfigSnapshot,
    source: &'a Src,
    parser: &'a P,
    filters: FilterPipeline,
    options: SyncOptions,
    cancel: CancelFlag,
    progress: Option<SharedProgress>,
    state: SyncState,
    committer: Committer<'a, S>,
    summary: RunSummary,
}

impl<'a, Src, P, S> SyncEngine<'a, Src, P, S>
where
    Src: RemoteSource + ?Sized,
    P: RowParser,
    S: SyncStore + ?Sized,
{
    pub fn new(
        snapshot: &'a ConfigSnapshot,
        source: &'a Src,
        parser: &'a P,
        store: &'a mut S,
        options: SyncOptions,
        cancel: CancelFlag,
    ) -> Result<Self, SyncError> {
        let filters = FilterPipeline::new(&snapshot.filters)?;
        let chunk = Chunk::new(options.chunk_size);
        Ok(Self {
            snapshot,
            source,
            parser,
            filters,
            options,
            cancel,
            progress: None,
            state: SyncState::Idle,
            committer: Committer {
                store,
                chunk,
                partial: FxHashSet::default(),
                commits: 0,
                rows_committed: 0,
                files_completed: 0,
            },
            summary: RunSummary::default(),
        })
    }

    /// Show a status line and per-file byte bars.
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Run to completion. Fatal errors leave the store consistent up to the
    /// last successful commit.
    pub fn run(&mut self) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        self.summary = RunSummary::default();

        self.recover()?;
        guard::check_and_record(&mut *self.committer.store, self.snapshot)?;

        enter(&mut self.state, SyncState::Planning);
        let mut queue = self.plan()?;
        self.summary.planned = queue.total();
        log::info!(
            "Planned {} files ({} already synced, {} sampled out)",
            fmt_num(queue.total()),
            fmt_num(self.summary.already_done),
            fmt_num(self.summary.sampled_out)
        );

        let stage = self
            .progress
            .as_ref()
            .map_or_else(ProgressBar::hidden, |p| p.run_line("sync", queue.total()));

        let mut stop = StopReason::Exhausted;
        let mut attempted = 0usize;
        while !queue.is_drained() {
            if self.cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }
            if self.options.max_files.is_some_and(|max| attempted >= max) {
                stop = StopReason::Limited;
                break;
            }
            if attempted > 0 && !self.cancel.sleep(self.options.politeness_delay) {
                stop = StopReason::Cancelled;
                break;
            }
            let Some(file) = queue.next().cloned() else {
                break;
            };
            attempted += 1;
            stage.inc(1);
            stage.set_message(format!(
                "{file}, {} rows",
                fmt_num(self.committer.rows_committed as usize + self.committer.chunk.len())
            ));

            match self.process_file(&file)? {
                FileOutcome::Done => {}
                FileOutcome::Failed(err) => self.handle_failure(&file, err)?,
                FileOutcome::Cancelled => {
                    log::info!("Cancelled while reading {file}");
                    if self.committer.roll_back(&file)? {
                        self.summary.rolled_back += 1;
                    }
                    stop = StopReason::Cancelled;
                    break;
                }
            }
        }

        enter(&mut self.state, SyncState::Committing);
        self.committer.flush()?;
        stage.finish_and_clear();

        enter(
            &mut self.state,
            match stop {
                StopReason::Exhausted => SyncState::Exhausted,
                StopReason::Limited => SyncState::Limited,
                StopReason::Cancelled => SyncState::Cancelled,
            },
        );
        self.summary.files_attempted = attempted;
        self.summary.files_completed = self.committer.files_completed;
        self.summary.commits = self.committer.commits;
        self.summary.rows_committed = self.committer.rows_committed;
        self.summary.stop = stop;
        self.summary.elapsed = started.elapsed();
        Ok(self.summary.clone())
    }

    /// Discard pending files left behind by an interrupted run.
    fn recover(&mut self) -> Result<(), SyncError> {
        let discarded = self
            .committer
            .store
            .discard_pending()
            .map_err(|e| SyncError::store("failed to roll back pending files", e))?;
        for file in &discarded {
            log::warn!("Rolled back {file} left pending by an interrupted run");
        }
        self.summary.rolled_back += discarded.len();
        Ok(())
    }

    /// Chronological queue of sampled files not yet done, up to the horizon.
    fn plan(&mut self) -> Result<WorkQueue<FileIdentity>, SyncError> {
        let horizon = self.options.horizon;
        let done: FxHashSet<FileIdentity> = self
            .committer
            .store
            .done_files()
            .map_err(|e| SyncError::store("failed to read progress", e))?
            .into_iter()
            .collect();

        let mut candidates = Vec::new();
        for date in self.snapshot.range.days(horizon.date()) {
            match self.source.list_candidates(date) {
                Ok(files) => candidates.extend(files),
                Err(e) => log::warn!("Could not list candidates for {date}: {e:#}"),
            }
        }
        candidates.retain(|f| self.snapshot.range.contains(f.date) && !f.is_after(horizon));

        let rate = self.snapshot.sample_rate;
        self.summary.already_done = candidates.iter().filter(|f| done.contains(*f)).count();
        self.summary.sampled_out = candidates
            .iter()
            .filter(|f| !done.contains(*f) && !sampler::include(f, rate))
            .count();

        Ok(WorkQueue::filtered(candidates, |f| {
            !done.contains(f) && sampler::include(f, rate)
        }))
    }

    fn file_bar(&self, file: &FileIdentity, raw: &RawFile) -> ProgressBar {
        self.progress
            .as_ref()
            .map_or_else(ProgressBar::hidden, |p| p.file_bar(file, raw.total_bytes))
    }

    fn process_file(&mut self, file: &FileIdentity) -> Result<FileOutcome, SyncError> {
        enter(&mut self.state, SyncState::Fetching(file.clone()));
        log::debug!("Fetching {file}");
        let raw = match self.source.fetch(file) {
            Ok(raw) => raw,
            Err(e) => return Ok(FileOutcome::Failed(e.into())),
        };
        let pb = self.file_bar(file, &raw);

        enter(&mut self.state, SyncState::Parsing(file.clone()));
        let RawFile {
            reader, counter, ..
        } = raw;
        let mut rows = self.parser.rows(file, reader, &self.filters);
        if let Some(counter) = counter {
            rows = rows.with_progress(pb.clone(), counter);
        }

        enter(&mut self.state, SyncState::Accumulating);
        let mut outcome = FileOutcome::Done;
        for item in rows.by_ref() {
            let row = match item {
                Ok(row) => row,
                Err(e) => {
                    outcome = FileOutcome::Failed(e);
                    break;
                }
            };
            if self.committer.chunk.is_full() {
                if self.cancel.is_cancelled() {
                    outcome = FileOutcome::Cancelled;
                    break;
                }
                enter(&mut self.state, SyncState::Committing);
                self.committer.flush()?;
                enter(&mut self.state, SyncState::Accumulating);
            }
            self.committer.chunk.push(file, row);
        }

        let stats = rows.stats();
        self.summary.lines.add(&stats);
        pb.finish_and_clear();

        if matches!(outcome, FileOutcome::Done) {
            log::debug!(
                "{file}: kept {} of {} lines",
                fmt_num(stats.rows_kept),
                fmt_num(stats.lines_scanned)
            );
            self.committer.chunk.complete(file.clone());
        }
        Ok(outcome)
    }

    fn handle_failure(&mut self, file: &FileIdentity, err: FileError) -> Result<(), SyncError> {
        let kind = err.kind();
        log::warn!("Skipping {file}: {err}");
        if self.committer.roll_back(file)? {
            self.summary.rolled_back += 1;
        }
        self.summary.record_failure(kind);
        if let Err(e) = self
            .committer
            .store
            .record_failure(file, kind, &err.to_string())
        {
            log::warn!("Could not record failure of {file}: {e:#}");
        }
        Ok(())
    }
}

/// Authorize `snapshot` and run one sync with default progress reporting off.
pub fn sync<Src, P, S>(
    snapshot: &ConfigSnapshot,
    source: &Src,
    parser: &P,
    store: &mut S,
    options: SyncOptions,
    cancel: CancelFlag,
) -> Result<RunSummary, SyncError>
where
    Src: RemoteSource + ?Sized,
    P: RowParser,
    S: SyncStore + ?Sized,
{
    SyncEngine::new(snapshot, source, parser, store, options, cancel)?.run()
}
