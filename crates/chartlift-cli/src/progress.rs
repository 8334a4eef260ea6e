//! Progress display with TTY detection.
//!
//! On a terminal the run is drawn as an `indicatif` bar on stderr. Anywhere
//! else each finished chart becomes one plain `[n/total]` line.

use std::time::Instant;

use chartlift_types::ChartIdentity;
use indicatif::{ProgressBar, ProgressStyle};

/// Detects whether stderr is connected to a terminal.
pub fn is_tty() -> bool {
    console::Term::stderr().is_term()
}

pub struct MigrationProgress {
    is_tty: bool,
    /// Created on the first finished chart, once the total is known.
    progress_bar: Option<ProgressBar>,
    finished: usize,
    failed: usize,
    start_time: Instant,
}

impl MigrationProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            is_tty: enabled && is_tty(),
            progress_bar: None,
            finished: 0,
            failed: 0,
            start_time: Instant::now(),
        }
    }

    /// Print a log line without tearing the bar.
    pub fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(pb) => pb.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }

    pub fn chart_finished(&mut self, index: usize, total: usize, chart: &ChartIdentity, ok: bool) {
        self.finished = index;
        if !ok {
            self.failed += 1;
        }
        let status = if ok { "migrated" } else { "failed" };

        if !self.is_tty {
            eprintln!("[{index}/{total}] {chart}: {status}");
            return;
        }

        let pb = self.progress_bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        pb.set_position(index as u64);
        pb.set_message(format!("{chart} {status}"));
    }

    pub fn finish(self) {
        let elapsed = self.start_time.elapsed();
        if let Some(pb) = self.progress_bar {
            pb.finish_with_message(format!(
                "{} charts processed, {} failed, in {elapsed:.1?}",
                self.finished, self.failed
            ));
        }
    }
}
