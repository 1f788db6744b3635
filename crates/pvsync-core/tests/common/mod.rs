//! In-memory collaborators for engine tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufReader, Read};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use pvsync_core::{
    AggregationSink, CancelFlag, ChunkCommit, ConfigSnapshot, DEFAULT_BASE_URL, DateRange,
    FailureKind, FetchError, FileIdentity, FilterSet, ParseError, ProgressStore, RawFile,
    RemoteSource, Row, RowParser, SnapshotStore, StreamError, SyncOptions,
};

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn file(date: &str, hour: u8) -> FileIdentity {
    FileIdentity::pageviews(d(date), hour)
}

pub fn snapshot(start: &str, end: &str, rate: f64, filters: FilterSet) -> ConfigSnapshot {
    ConfigSnapshot::new(
        DEFAULT_BASE_URL,
        0.0,
        DateRange::new(d(start), Some(d(end))),
        rate,
        filters,
    )
    .unwrap()
}

/// Options with no politeness delay and a horizon far in the future.
pub fn options(chunk_size: usize) -> SyncOptions {
    let snap = snapshot("2024-01-01", "2024-01-01", 1.0, FilterSet::default());
    SyncOptions::new(&snap)
        .with_chunk_size(chunk_size)
        .with_horizon(horizon("2030-01-01 00:00"))
}

pub fn horizon(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

/// `code title views bytes`, language is the first dot segment, `.m` marks mobile.
pub struct TestParser;

impl RowParser for TestParser {
    fn parse_line(&self, file: &FileIdentity, line: &str) -> Result<Row, ParseError> {
        let fields: Vec<&str> = line.split(' ').collect();
        let &[code, title, views, bytes] = fields.as_slice() else {
            return Err(ParseError::line(format!("expected 4 fields: {line:?}")));
        };
        let views = views
            .parse()
            .map_err(|_| ParseError::line(format!("bad views: {views:?}")))?;
        let bytes = bytes
            .parse()
            .map_err(|_| ParseError::line(format!("bad bytes: {bytes:?}")))?;
        let mut parts = code.split('.');
        let language = parts.next().unwrap_or_default().to_string();
        let mobile = parts.next() == Some("m");
        Ok(Row {
            date: file.date,
            hour: file.hour,
            domain_code: code.to_string(),
            language,
            domain: "wikipedia.org".to_string(),
            page_title: title.to_string(),
            mobile,
            views,
            bytes,
        })
    }
}

/// Rows `TestParser` produces for `lines(n, 10)`.
pub fn parsed(file: &FileIdentity, n: usize) -> Vec<Row> {
    lines(n, 10)
        .iter()
        .map(|l| TestParser.parse_line(file, l).unwrap())
        .collect()
}

/// What the fake remote does when a file is fetched.
#[derive(Clone)]
pub enum Script {
    Lines(Vec<String>),
    NotFound,
    Transient,
    /// Serve the lines, then fail the stream with `kind`.
    BreakAfter(Vec<String>, io::ErrorKind),
    /// Serve the lines, cancelling `flag` after `n` of them have been read.
    CancelAfter(Vec<String>, usize, CancelFlag),
}

/// `n` well-formed lines `en P{i} {views} 100`.
pub fn lines(n: usize, views: u64) -> Vec<String> {
    (0..n).map(|i| format!("en P{i} {views} 100")).collect()
}

#[derive(Default)]
pub struct FakeSource {
    pub files: BTreeMap<FileIdentity, Script>,
    /// Dates whose listing fails
    pub broken_dates: Vec<NaiveDate>,
    pub fetched: RefCell<Vec<FileIdentity>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: FileIdentity, script: Script) -> Self {
        self.files.insert(file, script);
        self
    }

    pub fn fetched(&self) -> Vec<FileIdentity> {
        self.fetched.borrow().clone()
    }
}

impl RemoteSource for FakeSource {
    fn list_candidates(&self, date: NaiveDate) -> Result<Vec<FileIdentity>> {
        if self.broken_dates.contains(&date) {
            return Err(anyhow!("listing unavailable for {date}"));
        }
        // Reverse order: the engine must sort
        Ok(self
            .files
            .keys()
            .filter(|f| f.date == date)
            .rev()
            .cloned()
            .collect())
    }

    fn fetch(&self, file: &FileIdentity) -> Result<RawFile, FetchError> {
        self.fetched.borrow_mut().push(file.clone());
        let script = self.files.get(file).cloned().ok_or_else(|| FetchError::NotFound {
            url: file.key(),
        })?;
        let reader = match script {
            Script::Lines(lines) => Trickle::new(lines),
            Script::NotFound => {
                return Err(FetchError::NotFound { url: file.key() });
            }
            Script::Transient => {
                return Err(FetchError::Transient(StreamError::Status {
                    code: 503,
                    url: file.key(),
                }));
            }
            Script::BreakAfter(lines, kind) => {
                let mut t = Trickle::new(lines);
                t.fail_with = Some(kind);
                t
            }
            Script::CancelAfter(lines, n, flag) => {
                let mut t = Trickle::new(lines);
                t.cancel_after = Some((n, flag));
                t
            }
        };
        Ok(RawFile::new(BufReader::with_capacity(64, reader)))
    }
}

/// Reader serving one line per `read` call.
pub struct Trickle {
    lines: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    served: usize,
    fail_with: Option<io::ErrorKind>,
    cancel_after: Option<(usize, CancelFlag)>,
}

impl Trickle {
    fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines
                .into_iter()
                .map(|l| format!("{l}\n").into_bytes())
                .collect(),
            current: Vec::new(),
            served: 0,
            fail_with: None,
            cancel_after: None,
        }
    }
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current.is_empty() {
            match self.lines.pop_front() {
                Some(line) => {
                    self.current = line;
                    self.served += 1;
                    if let Some((n, flag)) = &self.cancel_after {
                        if self.served > *n {
                            flag.cancel();
                        }
                    }
                }
                None => {
                    return match self.fail_with {
                        Some(kind) => Err(io::Error::new(kind, "stream broke")),
                        None => Ok(0),
                    };
                }
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.drain(..n);
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Done,
}

/// Store keeping everything in memory, with injectable commit failures.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Vec<(FileIdentity, Row)>,
    pub status: BTreeMap<FileIdentity, FileStatus>,
    pub snapshots: Vec<ConfigSnapshot>,
    pub failures: Vec<(FileIdentity, FailureKind)>,
    /// Row count of every successful `append`
    pub commits: Vec<usize>,
    /// Files marked done by each successful `append`/`mark_done`
    pub done_log: Vec<Vec<FileIdentity>>,
    /// Zero-based `append` call that fails
    pub fail_append_at: Option<usize>,
    appends: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose zero-based `n`th `append` fails.
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_append_at: Some(n),
            ..Self::default()
        }
    }

    pub fn rows_of(&self, file: &FileIdentity) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|(f, _)| f == file)
            .map(|(_, r)| r)
            .collect()
    }

    pub fn done(&self) -> Vec<FileIdentity> {
        self.status
            .iter()
            .filter(|(_, s)| **s == FileStatus::Done)
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn pending(&self) -> Vec<FileIdentity> {
        self.status
            .iter()
            .filter(|(_, s)| **s == FileStatus::Pending)
            .map(|(f, _)| f.clone())
            .collect()
    }
}

impl AggregationSink for MemoryStore {
    fn append(&mut self, commit: &ChunkCommit<'_>) -> Result<()> {
        let call = self.appends;
        self.appends += 1;
        if self.fail_append_at == Some(call) {
            return Err(anyhow!("injected commit failure"));
        }
        for span in commit.spans {
            for row in &commit.rows[span.rows.clone()] {
                self.rows.push((span.file.clone(), row.clone()));
            }
        }
        for file in commit.pending() {
            self.status.entry(file.clone()).or_insert(FileStatus::Pending);
        }
        for file in commit.completed {
            self.status.insert(file.clone(), FileStatus::Done);
        }
        self.commits.push(commit.rows.len());
        self.done_log.push(commit.completed.to_vec());
        Ok(())
    }

    fn discard(&mut self, file: &FileIdentity) -> Result<()> {
        self.rows.retain(|(f, _)| f != file);
        if self.status.get(file) == Some(&FileStatus::Pending) {
            self.status.remove(file);
        }
        Ok(())
    }

    fn discard_pending(&mut self) -> Result<Vec<FileIdentity>> {
        let pending = self.pending();
        for file in &pending {
            self.discard(file)?;
        }
        Ok(pending)
    }

    fn compact(&mut self) -> Result<()> {
        Ok(())
    }

    fn row_count_for(&self, range: &DateRange) -> Result<u64> {
        Ok(self.rows.iter().filter(|(_, r)| range.contains(r.date)).count() as u64)
    }
}

impl ProgressStore for MemoryStore {
    fn is_done(&self, file: &FileIdentity) -> Result<bool> {
        Ok(self.status.get(file) == Some(&FileStatus::Done))
    }

    fn done_files(&self) -> Result<Vec<FileIdentity>> {
        Ok(self.done())
    }

    fn mark_done(&mut self, files: &[FileIdentity]) -> Result<()> {
        for file in files {
            self.status.insert(file.clone(), FileStatus::Done);
        }
        self.done_log.push(files.to_vec());
        Ok(())
    }

    fn record_failure(
        &mut self,
        file: &FileIdentity,
        kind: FailureKind,
        _message: &str,
    ) -> Result<()> {
        self.failures.push((file.clone(), kind));
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn latest_snapshot(&self) -> Result<Option<ConfigSnapshot>> {
        Ok(self.snapshots.last().cloned())
    }

    fn record_snapshot(&mut self, snapshot: &ConfigSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}
