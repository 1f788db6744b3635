//! Bounded row buffer, the unit of atomic commit

use std::ops::Range;

use crate::store::ChunkCommit;
use crate::types::{FileIdentity, Row};

/// Default maximum rows held in memory before a commit.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Contiguous run of chunk rows that came from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpan {
    pub file: FileIdentity,
    pub rows: Range<usize>,
}

/// Rows accumulated across one or more files, plus which files finished.
#[derive(Debug)]
pub struct Chunk {
    bound: usize,
    rows: Vec<Row>,
    spans: Vec<FileSpan>,
    completed: Vec<FileIdentity>,
}

impl Chunk {
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            bound,
            rows: Vec::with_capacity(bound.min(64 * 1024)),
            spans: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.bound
    }

    /// Nothing to commit: no rows and no pending completions.
    pub fn is_idle(&self) -> bool {
        self.rows.is_empty() && self.completed.is_empty()
    }

    pub fn push(&mut self, file: &FileIdentity, row: Row) {
        let at = self.rows.len();
        self.rows.push(row);
        match self.spans.last_mut() {
            Some(span) if span.file == *file => span.rows.end = at + 1,
            _ => self.spans.push(FileSpan {
                file: file.clone(),
                rows: at..at + 1,
            }),
        }
    }

    /// Record that `file` has been fully consumed.
    pub fn complete(&mut self, file: FileIdentity) {
        self.completed.push(file);
    }

    pub fn completed(&self) -> &[FileIdentity] {
        &self.completed
    }

    /// Drop every row of `file` held in this chunk. Returns how many were dropped.
    pub fn truncate_file(&mut self, file: &FileIdentity) -> usize {
        let Some(pos) = self.spans.iter().position(|s| s.file == *file) else {
            return 0;
        };
        let span = self.spans.remove(pos);
        let dropped = span.rows.len();
        self.rows.drain(span.rows);
        for later in &mut self.spans[pos..] {
            later.rows.start -= dropped;
            later.rows.end -= dropped;
        }
        dropped
    }

    pub fn as_commit(&self) -> ChunkCommit<'_> {
        ChunkCommit {
            rows: &self.rows,
            spans: &self.spans,
            completed: &self.completed,
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.spans.clear();
        self.completed.clear();
    }
}
