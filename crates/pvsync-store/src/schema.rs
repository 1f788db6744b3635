//! SQL for the project database.
//!
//! Layout:
//! - `file_log`: one row per dump file ever touched, `pending` while its rows
//!   are partially committed, `done` once all of them are, `rolled_back`
//!   after a discard (the id is reused on retry)
//! - `pageviews`: aggregated facts keyed by `(file_id, domain_code, page_title)`
//! - `pv_staging`: appender target, emptied inside every commit
//! - `sync_snapshot`: append-only history of authorised configurations
//! - `sync_failure`: audit ledger of per-file failures

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_DONE: &str = "done";
pub const STATUS_ROLLED_BACK: &str = "rolled_back";

/// Idempotent DDL run on every open.
pub fn create_tables() -> &'static str {
    "CREATE SEQUENCE IF NOT EXISTS file_seq START 1;
     CREATE TABLE IF NOT EXISTS file_log (
         file_id BIGINT PRIMARY KEY DEFAULT nextval('file_seq'),
         file_key VARCHAR NOT NULL UNIQUE,
         date DATE NOT NULL,
         hour UTINYINT NOT NULL,
         partition VARCHAR NOT NULL,
         status VARCHAR NOT NULL,
         row_count UBIGINT NOT NULL DEFAULT 0,
         committed_at TIMESTAMP
     );
     CREATE TABLE IF NOT EXISTS pageviews (
         file_id BIGINT NOT NULL,
         date DATE NOT NULL,
         hour UTINYINT NOT NULL,
         domain_code VARCHAR NOT NULL,
         language VARCHAR NOT NULL,
         domain VARCHAR NOT NULL,
         mobile BOOLEAN NOT NULL,
         page_title VARCHAR NOT NULL,
         views UBIGINT NOT NULL,
         bytes UBIGINT NOT NULL,
         PRIMARY KEY (file_id, domain_code, page_title)
     );
     CREATE TABLE IF NOT EXISTS pv_staging (
         file_id BIGINT NOT NULL,
         date VARCHAR NOT NULL,
         hour UTINYINT NOT NULL,
         domain_code VARCHAR NOT NULL,
         language VARCHAR NOT NULL,
         domain VARCHAR NOT NULL,
         mobile BOOLEAN NOT NULL,
         page_title VARCHAR NOT NULL,
         views UBIGINT NOT NULL,
         bytes UBIGINT NOT NULL
     );
     CREATE SEQUENCE IF NOT EXISTS snapshot_seq START 1;
     CREATE TABLE IF NOT EXISTS sync_snapshot (
         id BIGINT PRIMARY KEY DEFAULT nextval('snapshot_seq'),
         config_json VARCHAR NOT NULL,
         input_hash VARCHAR NOT NULL,
         recorded_at TIMESTAMP NOT NULL DEFAULT current_timestamp
     );
     CREATE TABLE IF NOT EXISTS sync_failure (
         file_key VARCHAR NOT NULL,
         kind VARCHAR NOT NULL,
         message VARCHAR NOT NULL,
         recorded_at TIMESTAMP NOT NULL DEFAULT current_timestamp
     );
     CREATE OR REPLACE VIEW pageviews_flat AS
     SELECT p.domain_code, p.language, p.domain, p.mobile, p.page_title,
            CAST(p.date AS TIMESTAMP) + to_hours(CAST(p.hour AS BIGINT)) AS timestamp,
            p.views, p.bytes
     FROM pageviews p
     JOIN file_log f USING (file_id)
     WHERE f.status = 'done';"
}

/// Fold staged rows into `pageviews`, summing duplicate keys within the
/// batch and against rows already stored for the same file.
pub fn merge_staging() -> &'static str {
    "INSERT INTO pageviews
     SELECT file_id, CAST(date AS DATE), hour, domain_code,
            any_value(language), any_value(domain), bool_or(mobile), page_title,
            CAST(sum(views) AS UBIGINT), CAST(sum(bytes) AS UBIGINT)
     FROM pv_staging
     GROUP BY file_id, date, hour, domain_code, page_title
     ON CONFLICT (file_id, domain_code, page_title) DO UPDATE SET
         views = views + EXCLUDED.views,
         bytes = bytes + EXCLUDED.bytes"
}

pub fn clear_staging() -> &'static str {
    "DELETE FROM pv_staging"
}

pub fn insert_file() -> &'static str {
    "INSERT INTO file_log (file_key, date, hour, partition, status)
     VALUES (?, CAST(? AS DATE), ?, ?, 'pending')
     RETURNING file_id"
}

pub fn select_file() -> &'static str {
    "SELECT file_id, status FROM file_log WHERE file_key = ?"
}

pub fn set_status() -> &'static str {
    "UPDATE file_log SET status = ?, committed_at = current_timestamp WHERE file_id = ?"
}

pub fn add_row_count() -> &'static str {
    "UPDATE file_log SET row_count = row_count + ? WHERE file_id = ?"
}

pub fn select_done() -> &'static str {
    "SELECT CAST(date AS VARCHAR), hour, partition FROM file_log
     WHERE status = 'done'
     ORDER BY date, hour, partition"
}

pub fn count_done() -> &'static str {
    "SELECT count(*) FROM file_log WHERE status = 'done'"
}

pub fn select_pending() -> &'static str {
    "SELECT file_id, CAST(date AS VARCHAR), hour, partition FROM file_log
     WHERE status = 'pending'
     ORDER BY date, hour, partition"
}

pub fn delete_file_rows() -> &'static str {
    "DELETE FROM pageviews WHERE file_id = ?"
}

/// Params: status (`STATUS_ROLLED_BACK`), file_id
pub fn reset_file() -> &'static str {
    "UPDATE file_log SET status = ?, row_count = 0, committed_at = NULL
     WHERE file_id = ?"
}

/// Rows of completed files in `[start, end]`; `end` may be NULL for an open range.
pub fn count_rows() -> &'static str {
    "SELECT count(*) FROM pageviews p
     JOIN file_log f USING (file_id)
     WHERE f.status = 'done'
       AND p.date >= CAST(? AS DATE)
       AND (CAST(? AS DATE) IS NULL OR p.date <= CAST(? AS DATE))"
}

pub fn insert_snapshot() -> &'static str {
    "INSERT INTO sync_snapshot (config_json, input_hash) VALUES (?, ?)"
}

pub fn select_snapshots() -> &'static str {
    "SELECT id, config_json, input_hash, CAST(recorded_at AS VARCHAR)
     FROM sync_snapshot ORDER BY id"
}

pub fn select_latest_snapshot() -> &'static str {
    "SELECT config_json FROM sync_snapshot ORDER BY id DESC LIMIT 1"
}

pub fn insert_failure() -> &'static str {
    "INSERT INTO sync_failure (file_key, kind, message) VALUES (?, ?, ?)"
}

/// Failures of files that have not completed since.
pub fn outstanding_failures() -> &'static str {
    "SELECT s.kind, count(DISTINCT s.file_key) FROM sync_failure s
     LEFT JOIN file_log f ON f.file_key = s.file_key AND f.status = 'done'
     WHERE f.file_id IS NULL
     GROUP BY s.kind
     ORDER BY s.kind"
}

pub fn compact() -> &'static str {
    "VACUUM; CHECKPOINT;"
}
