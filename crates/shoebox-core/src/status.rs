use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl ScanState {
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Scanning | ScanState::Processing)
    }
}

/// Immutable progress snapshot handed to observers.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub status: ScanState,
    pub total_files: u64,
    pub processed: u64,
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub current_file: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Per-file result reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Copied,
    Skipped,
    Failed(String),
}

/// Owns the current [`ScanStatus`]. Writers build a new snapshot and swap it
/// in; readers clone the `Arc` and never observe a half-applied update.
#[derive(Debug, Default)]
pub struct ScanStatusTracker {
    current: RwLock<Arc<ScanStatus>>,
}

impl ScanStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ScanStatus> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn update<F: FnOnce(&mut ScanStatus)>(&self, f: F) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = ScanStatus::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Resets every counter; each scan starts from zero.
    pub fn begin(&self) {
        self.update(|s| *s = Self::fresh());
    }

    /// Like [`begin`](Self::begin), but refuses while a scan is active. The
    /// check and the reset happen under one write lock, so a scan is free to
    /// start exactly when the previous one has published its final state.
    pub fn try_begin(&self) -> bool {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.status.is_active() {
            return false;
        }
        *guard = Arc::new(Self::fresh());
        true
    }

    fn fresh() -> ScanStatus {
        ScanStatus {
            status: ScanState::Scanning,
            start_time: Some(Utc::now()),
            ..ScanStatus::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().status.is_active()
    }

    pub fn record(&self, file_name: &str, outcome: &FileOutcome) {
        self.update(|s| {
            s.status = ScanState::Processing;
            s.total_files += 1;
            s.processed += 1;
            s.current_file = file_name.to_string();
            match outcome {
                FileOutcome::Copied => s.copied += 1,
                FileOutcome::Skipped => s.skipped += 1,
                FileOutcome::Failed(_) => s.failed += 1,
            }
        });
    }

    pub fn finish(&self, state: ScanState, error: Option<String>) {
        self.update(|s| {
            s.status = state;
            s.end_time = Some(Utc::now());
            s.current_file.clear();
            s.error = error;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_each_outcome() {
        let tracker = ScanStatusTracker::new();
        tracker.begin();
        tracker.record("a.jpg", &FileOutcome::Copied);
        tracker.record("b.jpg", &FileOutcome::Skipped);
        tracker.record("c.jpg", &FileOutcome::Failed("copy failed".into()));

        let status = tracker.snapshot();
        assert_eq!(status.status, ScanState::Processing);
        assert_eq!(status.total_files, 3);
        assert_eq!(status.processed, 3);
        assert_eq!((status.copied, status.skipped, status.failed), (1, 1, 1));
        assert_eq!(status.current_file, "c.jpg");
    }

    #[test]
    fn test_begin_resets_previous_scan() {
        let tracker = ScanStatusTracker::new();
        tracker.begin();
        tracker.record("a.jpg", &FileOutcome::Copied);
        tracker.finish(ScanState::Completed, None);

        tracker.begin();
        let status = tracker.snapshot();
        assert_eq!(status.status, ScanState::Scanning);
        assert_eq!(status.total_files, 0);
        assert!(status.end_time.is_none());
    }

    #[test]
    fn test_try_begin_refuses_while_active() {
        let tracker = ScanStatusTracker::new();
        assert!(tracker.try_begin());
        assert!(!tracker.try_begin());
        tracker.record("a.jpg", &FileOutcome::Copied);
        assert!(!tracker.try_begin());

        tracker.finish(ScanState::Completed, None);
        assert!(tracker.try_begin());
        assert_eq!(tracker.snapshot().processed, 0);
    }

    #[test]
    fn test_old_snapshot_is_unchanged_by_updates() {
        let tracker = ScanStatusTracker::new();
        tracker.begin();
        let before = tracker.snapshot();
        tracker.record("a.jpg", &FileOutcome::Copied);
        assert_eq!(before.processed, 0);
        assert_eq!(tracker.snapshot().processed, 1);
    }

    #[test]
    fn test_serializes_for_observers() {
        let tracker = ScanStatusTracker::new();
        tracker.finish(ScanState::Error, Some("root missing".into()));
        let json = serde_json::to_value(&*tracker.snapshot()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "root missing");
        assert_eq!(json["totalFiles"], 0);
    }
}
