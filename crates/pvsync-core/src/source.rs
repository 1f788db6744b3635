//! Remote source and parser seams

use std::io::BufRead;

use chrono::NaiveDate;

use crate::error::{FetchError, ParseError};
use crate::filter::FilterPipeline;
use crate::lines::FileRows;
use crate::stream::ByteCounter;
use crate::types::{FileIdentity, Row};

/// Decompressed byte stream of one remote file.
pub struct RawFile {
    pub reader: Box<dyn BufRead + Send>,
    /// Compressed bytes received so far, for progress bars.
    pub counter: Option<ByteCounter>,
    pub total_bytes: Option<u64>,
}

impl RawFile {
    pub fn new(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            counter: None,
            total_bytes: None,
        }
    }

    pub fn with_progress(mut self, counter: ByteCounter, total_bytes: Option<u64>) -> Self {
        self.counter = Some(counter);
        self.total_bytes = total_bytes;
        self
    }
}

impl std::fmt::Debug for RawFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFile")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

pub trait RemoteSource {
    /// Candidate files for one date, in any order.
    fn list_candidates(&self, date: NaiveDate) -> anyhow::Result<Vec<FileIdentity>>;

    fn fetch(&self, file: &FileIdentity) -> Result<RawFile, FetchError>;
}

pub trait RowParser {
    /// Parse one line (without trailing newline) of `file`.
    fn parse_line(&self, file: &FileIdentity, line: &str) -> Result<Row, ParseError>;

    /// Lazy, filtered row sequence over a file's bytes.
    fn rows<'a, R: BufRead>(
        &'a self,
        file: &'a FileIdentity,
        reader: R,
        filters: &'a FilterPipeline,
    ) -> FileRows<'a, R, Self>
    where
        Self: Sized,
    {
        FileRows::new(file, reader, self, filters)
    }
}
