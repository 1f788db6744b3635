//! Run summary reporting

use std::time::Duration;

use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use rustc_hash::FxHashMap;

use crate::error::FailureKind;
use crate::lines::LineStats;
use crate::progress::fmt_num;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every planned file was attempted.
    Exhausted,
    /// The max-files budget was reached before the queue emptied.
    Limited,
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "exhausted",
            Self::Limited => "limited",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Outcome of one sync invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Files in the work queue after resume and sampling
    pub planned: usize,
    /// Candidates dropped by the sampler
    pub sampled_out: usize,
    /// Candidates already in the progress record
    pub already_done: usize,
    pub files_attempted: usize,
    pub files_completed: usize,
    pub failures: FxHashMap<FailureKind, usize>,
    pub commits: usize,
    pub rows_committed: u64,
    /// Pending files rolled back at startup or after a failure
    pub rolled_back: usize,
    pub lines: LineStats,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            planned: 0,
            sampled_out: 0,
            already_done: 0,
            files_attempted: 0,
            files_completed: 0,
            failures: FxHashMap::default(),
            commits: 0,
            rows_committed: 0,
            rolled_back: 0,
            lines: LineStats::default(),
            stop: StopReason::Exhausted,
            elapsed: Duration::ZERO,
        }
    }
}

impl RunSummary {
    pub fn record_failure(&mut self, kind: FailureKind) {
        *self.failures.entry(kind).or_default() += 1;
    }

    pub fn failed(&self, kind: FailureKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_failed(&self) -> usize {
        self.failures.values().sum()
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Sync")
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        let row = |table: &mut Table, label: &str, value: String| {
            table.add_row(vec![Cell::new(label), Cell::new(value)]);
        };

        row(&mut table, "Stopped", self.stop.to_string());
        row(
            &mut table,
            "Files",
            format!(
                "{}/{} ({} failed)",
                self.files_completed,
                self.planned,
                self.total_failed()
            ),
        );
        row(&mut table, "Already synced", fmt_num(self.already_done));
        row(&mut table, "Sampled out", fmt_num(self.sampled_out));
        for kind in [
            FailureKind::FetchNotFound,
            FailureKind::FetchTransient,
            FailureKind::ParseMalformed,
        ] {
            let n = self.failed(kind);
            if n > 0 {
                table.add_row(vec![
                    Cell::new(format!("  {kind}")).fg(Color::Yellow),
                    Cell::new(fmt_num(n)).fg(Color::Yellow),
                ]);
            }
        }
        row(&mut table, "Lines scanned", fmt_num(self.lines.lines_scanned));
        row(&mut table, "Line-filtered", fmt_num(self.lines.line_filtered));
        row(&mut table, "Row-filtered", fmt_num(self.lines.row_filtered));
        row(&mut table, "Malformed lines", fmt_num(self.lines.malformed));
        table.add_row(vec![
            Cell::new("Rows committed").fg(Color::Green),
            Cell::new(fmt_num(self.rows_committed as usize)).fg(Color::Green),
        ]);
        row(&mut table, "Commits", fmt_num(self.commits));
        if self.rolled_back > 0 {
            row(&mut table, "Rolled back", fmt_num(self.rolled_back));
        }
        row(
            &mut table,
            "Elapsed",
            format!("{:.1}s", self.elapsed.as_secs_f64()),
        );

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "Sync {}: {}/{} files, {} rows in {} commits, {} failed [{:.1}s]",
            self.stop,
            self.files_completed,
            self.planned,
            fmt_num(self.rows_committed as usize),
            self.commits,
            self.total_failed(),
            self.elapsed.as_secs_f64()
        );
    }
}
