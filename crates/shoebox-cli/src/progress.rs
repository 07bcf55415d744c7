use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use shoebox_core::{FileOutcome, ProgressReporter, ScanStatus};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner with running counters. The total file count is not known upfront,
/// so there is no bar.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar<F: FnOnce(&ProgressBar)>(&self, f: F) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, source_root: &str) {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.set_message(format!("Scanning {}...", source_root));
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_file_processed(&self, file_name: &str, outcome: &FileOutcome, status: &ScanStatus) {
        if let FileOutcome::Failed(reason) = outcome {
            self.with_bar(|pb| {
                pb.println(format!("  {} {}: {}", "✗".red(), file_name, reason));
            });
        }
        self.with_bar(|pb| {
            pb.set_message(format!(
                "{} files: {} copied, {} skipped, {} failed ({})",
                status.processed, status.copied, status.skipped, status.failed, file_name
            ));
        });
    }

    fn on_scan_complete(&self, status: &ScanStatus) {
        self.finish_bar();
        let mark = match status.status {
            shoebox_core::ScanState::Completed => "✓".green(),
            _ => "✗".red(),
        };
        eprintln!(
            "  {} Scan {:?}: {} files, {} copied, {} skipped, {} failed",
            mark, status.status, status.processed, status.copied, status.skipped, status.failed
        );
    }
}
