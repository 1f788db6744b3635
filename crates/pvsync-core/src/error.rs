//! Error taxonomy for sync runs
//!
//! Per-file errors ([`FileError`]) are recoverable: the engine skips the file,
//! counts it, and a later run retries it. [`SyncError`] is fatal to a run.

use std::fmt;

use crate::guard::Rejection;
use crate::stream::StreamError;
use crate::types::FileIdentity;

/// Failure to retrieve one remote file.
#[derive(Debug)]
pub enum FetchError {
    /// The remote resource does not exist (yet).
    NotFound { url: String },
    /// Network or server failure; the file is retried on the next run.
    Transient(StreamError),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { url } => write!(f, "not found: {url}"),
            Self::Transient(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Classify a stream error: HTTP 404/410 means the file is absent.
    pub fn from_stream(url: &str, e: StreamError) -> Self {
        if e.is_not_found() {
            Self::NotFound {
                url: url.to_string(),
            }
        } else {
            Self::Transient(e)
        }
    }
}

/// Failure to turn a file's bytes into rows.
#[derive(Debug)]
pub enum ParseError {
    /// A single line does not follow the dump grammar.
    Line { reason: String },
    /// Too many bad lines, or the byte stream itself is corrupt.
    Malformed { reason: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line { reason } => write!(f, "bad line: {reason}"),
            Self::Malformed { reason } => write!(f, "malformed file: {reason}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn line(reason: impl Into<String>) -> Self {
        Self::Line {
            reason: reason.into(),
        }
    }
}

/// Per-file failure category, used for run summaries and the failure ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    FetchNotFound,
    FetchTransient,
    ParseMalformed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchNotFound => "fetch_not_found",
            Self::FetchTransient => "fetch_transient",
            Self::ParseMalformed => "parse_malformed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable error from processing a single file.
#[derive(Debug)]
pub enum FileError {
    Fetch(FetchError),
    Parse(ParseError),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
        }
    }
}

impl std::error::Error for FileError {}

impl FileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch(FetchError::NotFound { .. }) => FailureKind::FetchNotFound,
            Self::Fetch(FetchError::Transient(_)) => FailureKind::FetchTransient,
            Self::Parse(_) => FailureKind::ParseMalformed,
        }
    }

    /// Map a read error from a file's byte stream.
    ///
    /// Corrupt compressed data is a parse problem; everything else
    /// (timeouts, resets) is a transient fetch problem.
    pub fn from_read(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                Self::Parse(ParseError::Malformed {
                    reason: e.to_string(),
                })
            }
            _ => Self::Fetch(FetchError::Transient(StreamError::Io(e))),
        }
    }
}

impl From<FetchError> for FileError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<ParseError> for FileError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Fatal error: aborts validation or the running sync.
#[derive(Debug)]
pub enum SyncError {
    /// Malformed configuration; never enters the sync loop.
    ConfigInvalid { field: &'static str, reason: String },
    /// Candidate configuration would invalidate committed data.
    ConsistencyRejected(Rejection),
    /// The sink refused a chunk; none of its files were marked complete.
    SinkCommitFailed {
        files: Vec<FileIdentity>,
        source: anyhow::Error,
    },
    /// Progress/snapshot bookkeeping failed outside a chunk commit.
    Store {
        context: String,
        source: anyhow::Error,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid { field, reason } => {
                write!(f, "invalid config `{field}`: {reason}")
            }
            Self::ConsistencyRejected(r) => write!(f, "config change rejected: {r}"),
            Self::SinkCommitFailed { files, source } => {
                let names: Vec<String> = files.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "commit failed for [{}]: {source:#}",
                    names.join(", ")
                )
            }
            Self::Store { context, source } => write!(f, "{context}: {source:#}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn store(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }
}

impl From<Rejection> for SyncError {
    fn from(r: Rejection) -> Self {
        Self::ConsistencyRejected(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, ErrorKind};

    fn http_err(code: u16) -> StreamError {
        StreamError::Status {
            code,
            url: "http://x/f.gz".to_string(),
        }
    }

    #[test]
    fn fetch_404_is_not_found() {
        let err = FetchError::from_stream("http://x/f.gz", http_err(404));
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert_eq!(FileError::from(err).kind(), FailureKind::FetchNotFound);
    }

    #[test]
    fn fetch_503_is_transient() {
        let err = FetchError::from_stream("http://x/f.gz", http_err(503));
        assert_eq!(FileError::from(err).kind(), FailureKind::FetchTransient);
    }

    #[test]
    fn read_timeout_is_transient() {
        let err = FileError::from_read(io::Error::new(ErrorKind::TimedOut, "stall"));
        assert_eq!(err.kind(), FailureKind::FetchTransient);
    }

    #[test]
    fn corrupt_gzip_is_malformed() {
        let err = FileError::from_read(io::Error::new(ErrorKind::InvalidInput, "corrupt deflate"));
        assert_eq!(err.kind(), FailureKind::ParseMalformed);
    }

    #[test]
    fn display_config_invalid_names_field() {
        let err = SyncError::config("sample_rate", "must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "invalid config `sample_rate`: must be within [0, 1]"
        );
    }

    #[test]
    fn failure_kind_names() {
        assert_eq!(FailureKind::FetchNotFound.to_string(), "fetch_not_found");
        assert_eq!(FailureKind::ParseMalformed.as_str(), "parse_malformed");
    }
}
