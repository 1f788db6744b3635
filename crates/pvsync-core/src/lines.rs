//! Line loop turning a file's bytes into filtered rows

use std::io::BufRead;
use std::sync::atomic::Ordering;

use indicatif::ProgressBar;

use crate::error::{FileError, ParseError};
use crate::filter::FilterPipeline;
use crate::progress::fmt_num;
use crate::source::RowParser;
use crate::stream::ByteCounter;
use crate::types::{FileIdentity, Row};

/// More malformed lines than this in one file fails the whole file.
pub const MAX_MALFORMED_LINES: usize = 1_000;

/// Initial capacity for the per-line read buffer
const LINE_BUF_CAPACITY: usize = 1024;

/// Progress update interval (every N lines to avoid overhead)
const UPDATE_INTERVAL: usize = 10_000;

/// Per-file line statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub lines_scanned: usize,
    /// Dropped by the raw-line stage
    pub line_filtered: usize,
    pub malformed: usize,
    /// Dropped by the parsed-row stage
    pub row_filtered: usize,
    pub rows_kept: usize,
}

impl LineStats {
    pub fn add(&mut self, other: &LineStats) {
        self.lines_scanned += other.lines_scanned;
        self.line_filtered += other.line_filtered;
        self.malformed += other.malformed;
        self.row_filtered += other.row_filtered;
        self.rows_kept += other.rows_kept;
    }
}

/// Iterator of accepted rows from one file.
///
/// Yields `Err` at most once (I/O failure or too many malformed lines),
/// after which it is exhausted.
pub struct FileRows<'a, R, P> {
    file: &'a FileIdentity,
    reader: R,
    parser: &'a P,
    filters: &'a FilterPipeline,
    buf: Vec<u8>,
    stats: LineStats,
    progress: Option<(ProgressBar, ByteCounter)>,
    finished: bool,
}

impl<'a, R: BufRead, P: RowParser> FileRows<'a, R, P> {
    pub fn new(
        file: &'a FileIdentity,
        reader: R,
        parser: &'a P,
        filters: &'a FilterPipeline,
    ) -> Self {
        Self {
            file,
            reader,
            parser,
            filters,
            buf: Vec::with_capacity(LINE_BUF_CAPACITY),
            stats: LineStats::default(),
            progress: None,
            finished: false,
        }
    }

    /// Update `pb` from `counter` every few thousand lines.
    pub fn with_progress(mut self, pb: ProgressBar, counter: ByteCounter) -> Self {
        self.progress = Some((pb, counter));
        self
    }

    pub fn stats(&self) -> LineStats {
        self.stats
    }

    fn report(&self) {
        if let Some((pb, counter)) = &self.progress {
            pb.set_position(counter.load(Ordering::Relaxed));
            pb.set_message(format!("{} rows", fmt_num(self.stats.rows_kept)));
        }
    }

    fn malformed(&mut self, reason: &str) -> Option<FileError> {
        self.stats.malformed += 1;
        if self.stats.malformed <= 5 {
            log::debug!("{}: skipping line {}: {reason}", self.file, self.stats.lines_scanned);
        }
        if self.stats.malformed > MAX_MALFORMED_LINES {
            return Some(FileError::Parse(ParseError::Malformed {
                reason: format!("more than {MAX_MALFORMED_LINES} malformed lines"),
            }));
        }
        None
    }

    fn next_row(&mut self) -> Result<Option<Row>, FileError> {
        loop {
            self.buf.clear();
            if self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(FileError::from_read)?
                == 0
            {
                return Ok(None);
            }
            self.stats.lines_scanned += 1;
            if self.stats.lines_scanned.is_multiple_of(UPDATE_INTERVAL) {
                self.report();
            }

            let mut end = self.buf.len();
            while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            if end == 0 {
                continue;
            }

            let line = match std::str::from_utf8(&self.buf[..end]) {
                Ok(line) => line,
                Err(e) => {
                    let reason = e.to_string();
                    match self.malformed(&reason) {
                        Some(err) => return Err(err),
                        None => continue,
                    }
                }
            };

            if !self.filters.accept_line(line) {
                self.stats.line_filtered += 1;
                continue;
            }

            let row = match self.parser.parse_line(self.file, line) {
                Ok(row) => row,
                Err(ParseError::Line { reason }) => match self.malformed(&reason) {
                    Some(err) => return Err(err),
                    None => continue,
                },
                Err(e @ ParseError::Malformed { .. }) => return Err(e.into()),
            };

            if !self.filters.accept_row(&row) {
                self.stats.row_filtered += 1;
                continue;
            }
            self.stats.rows_kept += 1;
            return Ok(Some(row));
        }
    }
}

impl<R: BufRead, P: RowParser> Iterator for FileRows<'_, R, P> {
    type Item = Result<Row, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                self.report();
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::snapshot::FilterSet;
    use chrono::NaiveDate;
    use std::io::{self, Cursor, Read};

    /// `code title views` with no decomposition
    struct TestParser;

    impl RowParser for TestParser {
        fn parse_line(&self, file: &FileIdentity, line: &str) -> Result<Row, ParseError> {
            let mut parts = line.split(' ');
            let (Some(code), Some(title), Some(views)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(ParseError::line("too few fields"));
            };
            let views = views
                .parse()
                .map_err(|_| ParseError::line(format!("bad views {views:?}")))?;
            Ok(Row {
                date: file.date,
                hour: file.hour,
                domain_code: code.into(),
                language: code.into(),
                domain: "wikipedia.org".into(),
                page_title: title.into(),
                mobile: false,
                views,
                bytes: 0,
            })
        }
    }

    fn file() -> FileIdentity {
        FileIdentity::pageviews(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 3)
    }

    fn collect(input: &[u8], filters: FilterSet) -> (Vec<Result<Row, FileError>>, LineStats) {
        let f = file();
        let pipeline = FilterPipeline::new(&filters).unwrap();
        let mut rows = TestParser.rows(&f, Cursor::new(input.to_vec()), &pipeline);
        let out: Vec<_> = rows.by_ref().collect();
        (out, rows.stats())
    }

    #[test]
    fn yields_filtered_rows() {
        let input = b"en A 5\nen B 50\nde C 50\nen D 500\n";
        let filters = FilterSet {
            domain_codes: Some(vec!["en".into()]),
            min_views: Some(10),
            max_views: Some(100),
            ..Default::default()
        };
        let (rows, stats) = collect(input, filters);
        let titles: Vec<_> = rows
            .into_iter()
            .map(|r| r.unwrap().page_title)
            .collect();
        assert_eq!(titles, vec!["B"]);
        assert_eq!(stats.lines_scanned, 4);
        assert_eq!(stats.line_filtered, 1);
        assert_eq!(stats.row_filtered, 2);
        assert_eq!(stats.rows_kept, 1);
    }

    #[test]
    fn skips_bad_lines_and_crlf() {
        let input = b"en A 1\r\ngarbage\n\nen B x\nen C 3";
        let (rows, stats) = collect(input, FilterSet::default());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(Result::is_ok));
        assert_eq!(stats.malformed, 2);
    }

    #[test]
    fn invalid_utf8_counts_as_malformed() {
        let input = b"en A 1\nen \xff\xfe 2\nen B 3\n";
        let (rows, stats) = collect(input, FilterSet::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn too_many_malformed_fails_file() {
        let mut input = Vec::new();
        for _ in 0..=MAX_MALFORMED_LINES {
            input.extend_from_slice(b"bad\n");
        }
        input.extend_from_slice(b"en A 1\n");
        let (rows, _) = collect(&input, FilterSet::default());
        assert_eq!(rows.len(), 1);
        let err = rows.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseMalformed);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn read_error_is_transient_and_final() {
        let f = file();
        let pipeline = FilterPipeline::default();
        let reader = io::BufReader::new(Cursor::new(b"en A 1\n".to_vec()).chain(FailingReader));
        let mut rows = TestParser.rows(&f, reader, &pipeline);
        assert!(rows.next().unwrap().is_ok());
        let err = rows.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), FailureKind::FetchTransient);
        assert!(rows.next().is_none());
    }
}
