//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one run line (files attempted, rows so far) plus a byte bar for
//! the dump file being streamed.
//! Non-TTY mode: hidden bars; the engine's log lines carry progress.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::types::FileIdentity;

/// Compressed bytes of the file being streamed
fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<25.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Size unknown (no Content-Length): bytes counter only
fn bytes_unsized_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<25.dim} {binary_bytes:>7} {wide_msg:.dim}")
        .expect("invalid template")
}

fn run_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.cyan.bold} [{pos}/{len}] {wide_msg}")
        .expect("invalid template")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Byte bar for one dump file; `total` is the compressed size if known.
    pub fn file_bar(&self, file: &FileIdentity, total: Option<u64>) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total.unwrap_or(0)));
        pb.set_style(match total {
            Some(_) => bytes_style(),
            None => bytes_unsized_style(),
        });
        pb.set_prefix(file.to_string());
        pb
    }

    /// Spinner line for a whole run over `files` planned files.
    ///
    /// Advance with `inc(1)` per attempted file; the message shows row totals.
    pub fn run_line(&self, label: &str, files: usize) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(files as u64));
        pb.set_style(run_style());
        pb.set_prefix(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - head).is_multiple_of(3) {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
