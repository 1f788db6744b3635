//! Project status report

use chrono::{NaiveDate, NaiveDateTime};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::error::SyncError;
use crate::progress::fmt_num;
use crate::sampler;
use crate::snapshot::ConfigSnapshot;
use crate::source::RemoteSource;
use crate::store::{AggregationSink, ProgressStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Sampled candidates up to the horizon
    pub files_total_estimate: usize,
    /// Completed files inside the configured range
    pub files_done: usize,
    pub last_synced_date: Option<NaiveDate>,
    pub row_count: u64,
}

impl SyncStatus {
    pub fn percent_done(&self) -> f64 {
        if self.files_total_estimate == 0 {
            return 100.0;
        }
        (self.files_done as f64 / self.files_total_estimate as f64 * 100.0).min(100.0)
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Status").fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        table.add_row(vec![
            Cell::new("Files"),
            Cell::new(format!(
                "{}/{} ({:.1}%)",
                fmt_num(self.files_done),
                fmt_num(self.files_total_estimate),
                self.percent_done()
            )),
        ]);
        table.add_row(vec![
            Cell::new("Last synced"),
            Cell::new(
                self.last_synced_date
                    .map_or_else(|| "-".to_string(), |d| d.to_string()),
            ),
        ]);
        table.add_row(vec![
            Cell::new("Rows").fg(Color::Green),
            Cell::new(fmt_num(self.row_count as usize)).fg(Color::Green),
        ]);
        format!("\n{table}")
    }
}

/// Compute status without touching the network beyond candidate listing.
pub fn status<Src, S>(
    snapshot: &ConfigSnapshot,
    source: &Src,
    store: &S,
    horizon: NaiveDateTime,
) -> Result<SyncStatus, SyncError>
where
    Src: RemoteSource + ?Sized,
    S: AggregationSink + ProgressStore + ?Sized,
{
    let mut files_total_estimate = 0;
    for date in snapshot.range.days(horizon.date()) {
        match source.list_candidates(date) {
            Ok(files) => {
                files_total_estimate += files
                    .iter()
                    .filter(|f| !f.is_after(horizon))
                    .filter(|f| sampler::include(f, snapshot.sample_rate))
                    .count();
            }
            Err(e) => log::warn!("Could not list candidates for {date}: {e:#}"),
        }
    }

    let done = store
        .done_files()
        .map_err(|e| SyncError::store("failed to read progress", e))?;
    let in_range: Vec<_> = done
        .iter()
        .filter(|f| snapshot.range.contains(f.date))
        .collect();
    let row_count = store
        .row_count_for(&snapshot.range)
        .map_err(|e| SyncError::store("failed to count rows", e))?;

    Ok(SyncStatus {
        files_total_estimate,
        files_done: in_range.len(),
        last_synced_date: in_range.iter().map(|f| f.date).max(),
        row_count,
    })
}
