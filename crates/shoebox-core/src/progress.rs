use crate::status::{FileOutcome, ScanStatus};

/// Trait for reporting scan progress.
///
/// The CLI implements it with indicatif. All methods default to no-ops and are
/// called from the drain thread, in queue order.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _source_root: &str) {}
    fn on_file_processed(&self, _file_name: &str, _outcome: &FileOutcome, _status: &ScanStatus) {}
    fn on_scan_complete(&self, _status: &ScanStatus) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
