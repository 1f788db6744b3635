//! Wikimedia dump sources
//!
//! URL layout:
//! ```text
//! {base}other/pageviews/{YYYY}/{YYYY}-{MM}/pageviews-{YYYYMMDD}-{HH}0000.gz
//! ```

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use pvsync_core::{FetchError, FileIdentity, RawFile, RemoteSource, gzip_lines, open_gzip_reader};

const HOURS: u8 = 24;

/// Path of a dump file relative to the mirror root.
pub fn dump_path(file: &FileIdentity) -> String {
    format!(
        "other/pageviews/{year}/{year}-{month}/pageviews-{ymd}-{hour:02}0000.gz",
        year = file.date.format("%Y"),
        month = file.date.format("%m"),
        ymd = file.date.format("%Y%m%d"),
        hour = file.hour,
    )
}

fn hourly_candidates(date: NaiveDate) -> Vec<FileIdentity> {
    (0..HOURS).map(|h| FileIdentity::pageviews(date, h)).collect()
}

/// Dumps served over HTTP by dumps.wikimedia.org or one of its mirrors.
#[derive(Debug, Clone)]
pub struct WikimediaSource {
    base_url: String,
}

impl WikimediaSource {
    /// `base_url` must end in `/`, as `ConfigSnapshot` normalises it.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, file: &FileIdentity) -> String {
        format!("{}{}", self.base_url, dump_path(file))
    }
}

impl RemoteSource for WikimediaSource {
    fn list_candidates(&self, date: NaiveDate) -> Result<Vec<FileIdentity>> {
        Ok(hourly_candidates(date))
    }

    fn fetch(&self, file: &FileIdentity) -> Result<RawFile, FetchError> {
        let url = self.url_for(file);
        log::debug!("GET {url}");
        let download = open_gzip_reader(&url).map_err(|e| FetchError::from_stream(&url, e))?;
        Ok(RawFile::new(download.reader).with_progress(download.counter, download.total_bytes))
    }
}

/// Dumps read from a local directory with the same layout as the server.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, file: &FileIdentity) -> PathBuf {
        self.root.join(dump_path(file))
    }
}

impl RemoteSource for LocalMirror {
    /// Only hours present on disk are candidates.
    fn list_candidates(&self, date: NaiveDate) -> Result<Vec<FileIdentity>> {
        Ok(hourly_candidates(date)
            .into_iter()
            .filter(|f| self.path_for(f).is_file())
            .collect())
    }

    fn fetch(&self, file: &FileIdentity) -> Result<RawFile, FetchError> {
        let path = self.path_for(file);
        let url = path.display().to_string();
        let handle = match File::open(&path) {
            Ok(h) => h,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FetchError::NotFound { url });
            }
            Err(e) => return Err(FetchError::Transient(e.into())),
        };
        let total = handle.metadata().ok().map(|m| m.len());
        let (reader, counter) = gzip_lines(handle);
        Ok(RawFile::new(reader).with_progress(counter, total))
    }
}
