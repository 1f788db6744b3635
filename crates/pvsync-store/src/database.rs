//! Project database: one DuckDB file per project

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use duckdb::{Connection, Transaction, params};
use pvsync_core::{
    AggregationSink, ChunkCommit, ConfigSnapshot, DateRange, FailureKind, FileIdentity,
    ProgressStore, SnapshotStore,
};

use crate::hash;
use crate::schema::{self, STATUS_DONE, STATUS_PENDING, STATUS_ROLLED_BACK};

/// One entry of the snapshot history.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub id: i64,
    pub snapshot: ConfigSnapshot,
    pub input_hash: String,
    pub recorded_at: String,
}

/// DuckDB-backed aggregation sink, progress record and snapshot history.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open an existing project database.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("Database does not exist at {}", path.display());
        }
        Self::open_or_create(path)
    }

    /// Create a new project database; fails if one already exists.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            bail!("Database already exists at {}", path.display());
        }
        Self::open_or_create(path)
    }

    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {}", path.display()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open DuckDB in-memory connection")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(schema::create_tables())
            .context("Failed to create schema")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw connection, for ad-hoc queries over `pageviews_flat`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Files whose rows are partially committed.
    pub fn pending_files(&self) -> Result<Vec<FileIdentity>> {
        Ok(self.pending()?.into_iter().map(|(_, f)| f).collect())
    }

    fn pending(&self) -> Result<Vec<(i64, FileIdentity)>> {
        let mut stmt = self.conn.prepare(schema::select_pending())?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, date, hour, partition) = row?;
            out.push((id, FileIdentity::new(parse_date(&date)?, hour, partition)));
        }
        Ok(out)
    }

    /// Every recorded snapshot, oldest first.
    pub fn snapshot_history(&self) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(schema::select_snapshots())?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, json, input_hash, recorded_at) = row?;
            let snapshot = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt snapshot #{id} in database"))?;
            out.push(SnapshotRecord {
                id,
                snapshot,
                input_hash,
                recorded_at,
            });
        }
        Ok(out)
    }

    /// Failure counts by kind for files that have not completed since failing.
    pub fn outstanding_failures(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(schema::outstanding_failures())?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        rows.collect::<duckdb::Result<_>>()
            .context("Failed to read failure ledger")
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Bad date in database: {s}"))
}

fn lookup(conn: &Connection, file: &FileIdentity) -> Result<Option<(i64, String)>> {
    let mut stmt = conn.prepare(schema::select_file())?;
    let mut rows = stmt.query(params![file.key()])?;
    match rows.next()? {
        Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
        None => Ok(None),
    }
}

/// Look up or register a file, reviving rolled-back entries as pending.
fn file_id(tx: &Transaction<'_>, file: &FileIdentity) -> Result<i64> {
    if let Some((id, status)) = lookup(tx, file)? {
        if status != STATUS_PENDING && status != STATUS_DONE {
            tx.execute(schema::set_status(), params![STATUS_PENDING, id])?;
        }
        return Ok(id);
    }
    let id = tx.query_row(
        schema::insert_file(),
        params![file.key(), file.date.to_string(), file.hour, file.partition],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn discard_in(tx: &Transaction<'_>, id: i64) -> Result<()> {
    tx.execute(schema::delete_file_rows(), params![id])?;
    tx.execute(schema::reset_file(), params![STATUS_ROLLED_BACK, id])?;
    Ok(())
}

impl AggregationSink for Database {
    fn append(&mut self, commit: &ChunkCommit<'_>) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut appender = tx.appender("pv_staging")?;
            for span in commit.spans {
                let id = file_id(&tx, &span.file)?;
                for row in &commit.rows[span.rows.clone()] {
                    appender.append_row(params![
                        id,
                        row.date.to_string(),
                        row.hour,
                        row.domain_code,
                        row.language,
                        row.domain,
                        row.mobile,
                        row.page_title,
                        row.views,
                        row.bytes,
                    ])?;
                }
                tx.execute(
                    schema::add_row_count(),
                    params![span.rows.len() as u64, id],
                )?;
            }
            appender.flush()?;
        }
        tx.execute_batch(schema::merge_staging())
            .context("Failed to merge staged rows")?;
        tx.execute_batch(schema::clear_staging())?;
        for file in commit.completed {
            let id = file_id(&tx, file)?;
            tx.execute(schema::set_status(), params![STATUS_DONE, id])?;
        }
        tx.commit().context("Failed to commit chunk")?;
        Ok(())
    }

    fn discard(&mut self, file: &FileIdentity) -> Result<()> {
        let tx = self.conn.transaction()?;
        let id = lookup(&tx, file)?;
        match id {
            Some((id, status)) if status == STATUS_PENDING => discard_in(&tx, id)?,
            Some((_, status)) if status == STATUS_DONE => {
                log::warn!("Refusing to discard completed file {file}");
            }
            _ => {}
        }
        tx.commit()?;
        Ok(())
    }

    fn discard_pending(&mut self) -> Result<Vec<FileIdentity>> {
        let pending = self.pending()?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.conn.transaction()?;
        for (id, _) in &pending {
            discard_in(&tx, *id)?;
        }
        tx.commit().context("Failed to roll back pending files")?;
        Ok(pending.into_iter().map(|(_, f)| f).collect())
    }

    fn compact(&mut self) -> Result<()> {
        self.conn
            .execute_batch(schema::compact())
            .context("Failed to compact database")
    }

    fn row_count_for(&self, range: &DateRange) -> Result<u64> {
        let start = range.start.to_string();
        let end = range.end.map(|d| d.to_string());
        let n: i64 = self
            .conn
            .query_row(schema::count_rows(), params![start, end, end], |row| {
                row.get(0)
            })
            .context("Failed to count rows")?;
        Ok(n as u64)
    }
}

impl ProgressStore for Database {
    fn is_done(&self, file: &FileIdentity) -> Result<bool> {
        Ok(lookup(&self.conn, file)?.is_some_and(|(_, status)| status == STATUS_DONE))
    }

    fn done_files(&self) -> Result<Vec<FileIdentity>> {
        let mut stmt = self.conn.prepare(schema::select_done())?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (date, hour, partition) = row?;
            out.push(FileIdentity::new(parse_date(&date)?, hour, partition));
        }
        Ok(out)
    }

    fn mark_done(&mut self, files: &[FileIdentity]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for file in files {
            let id = file_id(&tx, file)?;
            tx.execute(schema::set_status(), params![STATUS_DONE, id])?;
        }
        tx.commit().context("Failed to record completed files")?;
        Ok(())
    }

    fn has_committed_any(&self) -> Result<bool> {
        let n: i64 = self
            .conn
            .query_row(schema::count_done(), [], |row| row.get(0))?;
        Ok(n > 0)
    }

    fn record_failure(
        &mut self,
        file: &FileIdentity,
        kind: FailureKind,
        message: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                schema::insert_failure(),
                params![file.key(), kind.as_str(), message],
            )
            .context("Failed to record failure")?;
        Ok(())
    }
}

impl SnapshotStore for Database {
    fn latest_snapshot(&self) -> Result<Option<ConfigSnapshot>> {
        let mut stmt = self.conn.prepare(schema::select_latest_snapshot())?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let json: String = row.get(0)?;
        let snapshot = serde_json::from_str(&json).context("Corrupt snapshot in database")?;
        Ok(Some(snapshot))
    }

    fn record_snapshot(&mut self, snapshot: &ConfigSnapshot) -> Result<()> {
        let json = hash::canonical_json(snapshot)?;
        let input_hash = hash::hash_bytes(json.as_bytes()).to_hex().to_string();
        self.conn
            .execute(schema::insert_snapshot(), params![json, input_hash])
            .context("Failed to record snapshot")?;
        log::debug!("Recorded snapshot {}", &input_hash[..8]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvsync_core::{Chunk, Row};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(file: &FileIdentity, title: &str, views: u64) -> Row {
        Row {
            date: file.date,
            hour: file.hour,
            domain_code: "en".into(),
            language: "en".into(),
            domain: "wikipedia.org".into(),
            page_title: title.into(),
            mobile: false,
            views,
            bytes: 0,
        }
    }

    fn views_of(db: &Database, title: &str) -> Option<u64> {
        let mut stmt = db
            .connection()
            .prepare("SELECT views FROM pageviews WHERE page_title = ?")
            .unwrap();
        let mut rows = stmt.query(params![title]).unwrap();
        rows.next().unwrap().map(|r| r.get::<_, u64>(0).unwrap())
    }

    #[test]
    fn duplicate_keys_are_summed() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-01-01"), 3);
        let mut chunk = Chunk::new(10);
        chunk.push(&f, row(&f, "A", 2));
        chunk.push(&f, row(&f, "A", 5));
        chunk.push(&f, row(&f, "B", 1));
        chunk.complete(f.clone());
        db.append(&chunk.as_commit()).unwrap();

        assert_eq!(views_of(&db, "A"), Some(7));
        assert_eq!(views_of(&db, "B"), Some(1));
        assert!(db.is_done(&f).unwrap());
    }

    #[test]
    fn split_file_stays_pending_until_completed() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-01-01"), 0);
        let mut chunk = Chunk::new(2);
        chunk.push(&f, row(&f, "A", 1));
        chunk.push(&f, row(&f, "B", 1));
        db.append(&chunk.as_commit()).unwrap();
        chunk.clear();

        assert!(!db.is_done(&f).unwrap());
        assert_eq!(db.pending_files().unwrap(), vec![f.clone()]);

        chunk.push(&f, row(&f, "A", 4));
        chunk.complete(f.clone());
        db.append(&chunk.as_commit()).unwrap();

        assert!(db.is_done(&f).unwrap());
        assert!(db.pending_files().unwrap().is_empty());
        assert_eq!(views_of(&db, "A"), Some(5));
    }

    #[test]
    fn discard_pending_removes_rows() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-01-01"), 0);
        let mut chunk = Chunk::new(5);
        chunk.push(&f, row(&f, "A", 1));
        db.append(&chunk.as_commit()).unwrap();

        assert_eq!(db.discard_pending().unwrap(), vec![f.clone()]);
        assert_eq!(views_of(&db, "A"), None);
        assert!(db.discard_pending().unwrap().is_empty());
        let (_, status) = lookup(db.connection(), &f).unwrap().unwrap();
        assert_eq!(status, STATUS_ROLLED_BACK);

        // Retry reuses the rolled-back entry
        chunk.clear();
        chunk.push(&f, row(&f, "A", 3));
        chunk.complete(f.clone());
        db.append(&chunk.as_commit()).unwrap();
        assert_eq!(views_of(&db, "A"), Some(3));
        assert_eq!(db.done_files().unwrap(), vec![f]);
    }

    #[test]
    fn discard_leaves_done_files_alone() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-01-01"), 0);
        let mut chunk = Chunk::new(5);
        chunk.push(&f, row(&f, "A", 1));
        chunk.complete(f.clone());
        db.append(&chunk.as_commit()).unwrap();

        db.discard(&f).unwrap();
        assert!(db.is_done(&f).unwrap());
        assert_eq!(views_of(&db, "A"), Some(1));
    }

    #[test]
    fn mark_done_without_rows() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-02-29"), 23);
        assert!(!db.has_committed_any().unwrap());
        db.mark_done(std::slice::from_ref(&f)).unwrap();
        assert!(db.has_committed_any().unwrap());
        assert_eq!(db.done_files().unwrap(), vec![f]);
    }

    #[test]
    fn row_count_respects_range_and_status() {
        let mut db = Database::in_memory().unwrap();
        let a = FileIdentity::pageviews(d("2024-01-01"), 0);
        let b = FileIdentity::pageviews(d("2024-01-05"), 0);
        let c = FileIdentity::pageviews(d("2024-01-06"), 0);
        let mut chunk = Chunk::new(10);
        chunk.push(&a, row(&a, "A", 1));
        chunk.complete(a.clone());
        chunk.push(&b, row(&b, "B", 1));
        chunk.push(&b, row(&b, "C", 1));
        chunk.complete(b.clone());
        chunk.push(&c, row(&c, "D", 1));
        db.append(&chunk.as_commit()).unwrap();

        let all = DateRange::new(d("2024-01-01"), None);
        assert_eq!(db.row_count_for(&all).unwrap(), 3);
        let early = DateRange::new(d("2024-01-01"), Some(d("2024-01-02")));
        assert_eq!(db.row_count_for(&early).unwrap(), 1);
    }

    #[test]
    fn outstanding_failures_clear_on_completion() {
        let mut db = Database::in_memory().unwrap();
        let f = FileIdentity::pageviews(d("2024-01-01"), 0);
        let g = FileIdentity::pageviews(d("2024-01-01"), 1);
        db.record_failure(&f, FailureKind::FetchTransient, "timeout").unwrap();
        db.record_failure(&f, FailureKind::FetchTransient, "timeout").unwrap();
        db.record_failure(&g, FailureKind::FetchNotFound, "404").unwrap();
        assert_eq!(
            db.outstanding_failures().unwrap(),
            vec![
                ("fetch_not_found".to_string(), 1),
                ("fetch_transient".to_string(), 1)
            ]
        );
        db.mark_done(&[f]).unwrap();
        assert_eq!(
            db.outstanding_failures().unwrap(),
            vec![("fetch_not_found".to_string(), 1)]
        );
    }
}
