//! pvsync-store: DuckDB-backed storage for pageview sync projects
//!
//! One database file per project holds the aggregated pageviews together
//! with the progress record, snapshot history and failure ledger, so that
//! rows and their progress markers always move in the same transaction.

pub mod database;
pub mod hash;
pub mod lock;
mod schema;

pub use database::{Database, SnapshotRecord};
pub use hash::{hash_bytes, short_hash, snapshot_hash};
pub use lock::SyncLock;
