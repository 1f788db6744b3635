//! End-to-end: gzip fixtures in a local mirror, synced into DuckDB.
//!
//! The `live_*` tests need network access and are marked #[ignore].
//! Run with: cargo test -p pvsync-wikimedia --test sync -- --ignored

use std::io::Write;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use flate2::Compression;
use flate2::write::GzEncoder;
use pvsync_core::{
    AggregationSink, CancelFlag, ConfigSnapshot, DEFAULT_BASE_URL, DateRange, FailureKind,
    FileIdentity, FilterSet, ProgressStore, StopReason, SyncOptions, sync,
};
use pvsync_store::Database;
use pvsync_wikimedia::{LocalMirror, PageviewParser, WikimediaSource};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn write_dump(mirror: &LocalMirror, file: &FileIdentity, body: &str) {
    let path = mirror.path_for(file);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut enc = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn snapshot(filters: FilterSet) -> ConfigSnapshot {
    ConfigSnapshot::new(
        DEFAULT_BASE_URL,
        0.0,
        DateRange::new(d("2024-08-18"), Some(d("2024-08-18"))),
        1.0,
        filters,
    )
    .unwrap()
}

fn options(snap: &ConfigSnapshot, chunk: usize) -> SyncOptions {
    let horizon = NaiveDateTime::parse_from_str("2030-01-01 00:00", "%Y-%m-%d %H:%M").unwrap();
    SyncOptions::new(snap)
        .with_chunk_size(chunk)
        .with_horizon(horizon)
}

fn views(db: &Database, code: &str, title: &str) -> Option<u64> {
    let mut stmt = db
        .connection()
        .prepare("SELECT CAST(sum(views) AS BIGINT) FROM pageviews_flat WHERE domain_code = ? AND page_title = ?")
        .unwrap();
    let mut rows = stmt.query([code, title]).unwrap();
    rows.next()
        .unwrap()
        .and_then(|r| r.get::<_, Option<i64>>(0).unwrap())
        .map(|v| v as u64)
}

fn mirror_with_day(root: &Path) -> LocalMirror {
    let mirror = LocalMirror::new(root);
    write_dump(
        &mirror,
        &FileIdentity::pageviews(d("2024-08-18"), 9),
        "en Rust 10 0\nen.m Rust 4 0\nde Rost 2 0\nen Ferris 1 0\n",
    );
    write_dump(
        &mirror,
        &FileIdentity::pageviews(d("2024-08-18"), 10),
        "en Rust 20 0\ncommons.m Main_Page 7 0\nnot a valid line at all\n",
    );
    mirror
}

#[test]
fn syncs_mirror_into_duckdb() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = mirror_with_day(&dir.path().join("mirror"));
    let mut db = Database::create(&dir.path().join("p.duckdb")).unwrap();
    let snap = snapshot(FilterSet {
        languages: Some(vec!["en".into(), "commons".into()]),
        min_views: Some(2),
        ..Default::default()
    });

    let summary = sync(
        &snap,
        &mirror,
        &PageviewParser,
        &mut db,
        options(&snap, 2),
        CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.files_completed, 2);
    assert_eq!(summary.lines.malformed, 1);
    assert_eq!(views(&db, "en", "Rust"), Some(30));
    assert_eq!(views(&db, "en.m", "Rust"), Some(4));
    assert_eq!(views(&db, "de", "Rost"), None);
    assert_eq!(views(&db, "en", "Ferris"), None);
    assert_eq!(views(&db, "commons.m", "Main_Page"), Some(7));
    let domain: String = db
        .connection()
        .query_row(
            "SELECT domain FROM pageviews WHERE domain_code = 'commons.m'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(domain, "wikimedia.org");

    let again = sync(
        &snap,
        &mirror,
        &PageviewParser,
        &mut db,
        options(&snap, 2),
        CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(again.files_attempted, 0);
    assert_eq!(again.already_done, 2);
}

#[test]
fn corrupt_dump_is_malformed_and_leaves_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = mirror_with_day(&dir.path().join("mirror"));
    let bad = FileIdentity::pageviews(d("2024-08-18"), 11);
    let path = mirror.path_for(&bad);
    std::fs::write(&path, b"this is not gzip").unwrap();

    let mut db = Database::in_memory().unwrap();
    let snap = snapshot(FilterSet::default());
    let summary = sync(
        &snap,
        &mirror,
        &PageviewParser,
        &mut db,
        options(&snap, 1),
        CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(summary.files_completed, 2);
    assert_eq!(summary.failed(FailureKind::ParseMalformed), 1);
    assert!(!db.is_done(&bad).unwrap());
    assert!(db.pending_files().unwrap().is_empty());
    assert_eq!(
        db.outstanding_failures().unwrap(),
        vec![("parse_malformed".to_string(), 1)]
    );
    let range = DateRange::new(d("2024-08-18"), None);
    assert_eq!(db.row_count_for(&range).unwrap(), 6);
}

#[test]
fn max_files_resumes_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = mirror_with_day(&dir.path().join("mirror"));
    let db_path = dir.path().join("p.duckdb");
    let snap = snapshot(FilterSet::default());

    {
        let mut db = Database::create(&db_path).unwrap();
        let summary = sync(
            &snap,
            &mirror,
            &PageviewParser,
            &mut db,
            options(&snap, 100).with_max_files(Some(1)),
            CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(summary.stop, StopReason::Limited);
        assert_eq!(
            db.done_files().unwrap(),
            vec![FileIdentity::pageviews(d("2024-08-18"), 9)]
        );
    }

    let mut db = Database::open(&db_path).unwrap();
    let summary = sync(
        &snap,
        &mirror,
        &PageviewParser,
        &mut db,
        options(&snap, 100),
        CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.files_completed, 1);
    assert_eq!(db.done_files().unwrap().len(), 2);
}

#[test]
#[ignore]
fn live_single_hour() {
    let mut db = Database::in_memory().unwrap();
    let snap = ConfigSnapshot::new(
        DEFAULT_BASE_URL,
        0.0,
        DateRange::new(d("2024-08-18"), Some(d("2024-08-18"))),
        1.0,
        FilterSet {
            domain_codes: Some(vec!["la".into()]),
            ..Default::default()
        },
    )
    .unwrap();
    let source = WikimediaSource::new(&snap.base_url);

    let summary = sync(
        &snap,
        &source,
        &PageviewParser,
        &mut db,
        SyncOptions::new(&snap).with_max_files(Some(1)),
        CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(summary.files_completed, 1);
    assert!(
        summary.rows_committed > 1_000,
        "Expected a sizeable Latin Wikipedia hour, got {} rows",
        summary.rows_committed
    );
}
