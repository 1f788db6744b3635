//! pvsync core - incremental sync engine for hourly pageview dumps
//!
//! This crate holds the backend-agnostic parts: configuration model,
//! sampler, filter pipeline, consistency guard, the collaborator traits,
//! and the engine that ties them together.

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod guard;
pub mod lines;
pub mod logging;
pub mod progress;
pub mod sampler;
pub mod shutdown;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod store;
pub mod stream;
pub mod summary;
pub mod types;
pub mod work_queue;

// Re-exports for convenience
pub use chunk::{Chunk, DEFAULT_CHUNK_SIZE, FileSpan};
pub use config::{CHUNK_SIZE_ENV, ProjectConfig};
pub use engine::{SyncEngine, SyncOptions, SyncState, sync};
pub use error::{FailureKind, FetchError, FileError, ParseError, SyncError};
pub use filter::FilterPipeline;
pub use guard::Rejection;
pub use lines::{FileRows, LineStats};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use shutdown::CancelFlag;
pub use snapshot::{ConfigSnapshot, DEFAULT_BASE_URL, FilterSet};
pub use source::{RawFile, RemoteSource, RowParser};
pub use status::{SyncStatus, status};
pub use store::{AggregationSink, ChunkCommit, ProgressStore, SnapshotStore, SyncStore};
pub use stream::{
    ByteCounter, Download, GzipLines, GzipReader, HttpConfig, SHARED_RUNTIME, StreamError,
    gzip_lines, open_gzip_reader, set_http_config,
};
pub use summary::{RunSummary, StopReason};
pub use types::{DateRange, FileIdentity, PAGEVIEWS_PARTITION, Row};
