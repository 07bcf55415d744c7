use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::lifecycle::CancellationToken;
use crate::pipeline::{IngestPipeline, IngestedFile};
use crate::progress::ProgressReporter;
use crate::scanner::Walker;
use crate::status::{FileOutcome, ScanState, ScanStatus, ScanStatusTracker};
use crate::storage::{Database, IncomingRecord, OutcomingRecord, Page};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
}

/// One file that did not make it, for end-of-scan reporting.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub src_path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub retired_incoming: usize,
    pub failures: Vec<FailedFile>,
    pub duration: Duration,
}

/// Owns the status tracker. Every call opens its own connection and releases
/// it when done.
///
/// A scan works against the catalog of the library it writes into
/// (`<dest_root>/shoebox.db` unless a database path is pinned). Catalog reads
/// use the configured library.
pub struct Engine {
    config: AppConfig,
    db_override: Option<PathBuf>,
    tracker: Arc<ScanStatusTracker>,
    lifecycle: CancellationToken,
}

impl Engine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            db_override: None,
            tracker: Arc::new(ScanStatusTracker::new()),
            lifecycle: CancellationToken::new(),
        }
    }

    /// Pins one database for scans and reads alike.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_override = Some(path.into());
        self
    }

    /// Ties every scan to a process-wide token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.lifecycle = token;
        self
    }

    /// Database used by catalog reads and `clear_all`.
    pub fn db_path(&self) -> PathBuf {
        self.db_override
            .clone()
            .unwrap_or_else(|| self.config.resolved_database_path())
    }

    fn scan_db_path(&self, dest_root: &Path) -> PathBuf {
        self.db_override
            .clone()
            .unwrap_or_else(|| self.config.database_path_for(dest_root))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> Arc<ScanStatus> {
        self.tracker.snapshot()
    }

    fn open_db(&self) -> Result<Database, Error> {
        Database::open(self.db_path())
    }

    /// Starts a scan in the background and returns immediately. Dropping the
    /// returned handle detaches the scan; it still runs to completion.
    pub fn start_scan(
        &self,
        request: ScanRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ScanHandle, Error> {
        if config::same_location(&request.source_root, &request.dest_root) {
            return Err(Error::DestinationIsSource(request.dest_root));
        }
        if !self.tracker.try_begin() {
            return Err(Error::ScanInProgress);
        }

        let db_path = self.scan_db_path(&request.dest_root);
        let prepared = fs::create_dir_all(&request.dest_root)
            .map_err(Error::from)
            .and_then(|_| Database::open(&db_path));
        let db = match prepared {
            Ok(db) => db,
            Err(e) => {
                self.tracker.finish(ScanState::Error, Some(e.to_string()));
                return Err(e);
            }
        };

        info!(
            "Starting scan of {} into {} (catalog {})",
            request.source_root.display(),
            request.dest_root.display(),
            db_path.display()
        );

        let job = ScanJob {
            request,
            ignore_patterns: self.config.ignore_patterns.clone(),
            queue_capacity: self.config.queue_capacity.max(1),
            thumbnail_max_dim: self.config.thumbnail_max_dim,
            tracker: Arc::clone(&self.tracker),
            reporter,
            cancel: self.lifecycle.clone(),
        };
        let cancel = job.cancel.clone();

        let spawned = thread::Builder::new()
            .name("scan-coordinator".into())
            .spawn(move || job.run(db));
        let finisher = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.tracker
                    .finish(ScanState::Error, Some(format!("failed to spawn scan: {}", e)));
                return Err(e.into());
            }
        };

        Ok(ScanHandle {
            finisher,
            cancel,
            tracker: Arc::clone(&self.tracker),
        })
    }

    /// Blocking convenience over [`Engine::start_scan`].
    pub fn scan(
        &self,
        request: ScanRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ScanReport, Error> {
        self.start_scan(request, reporter)?.wait()
    }

    pub fn list_incoming(&self, offset: i64, limit: i64) -> Result<Page<IncomingRecord>, Error> {
        let (offset, limit) = clamp_page(offset, limit);
        self.open_db()?.list_incoming(offset, limit)
    }

    pub fn list_outcoming(&self, offset: i64, limit: i64) -> Result<Page<OutcomingRecord>, Error> {
        let (offset, limit) = clamp_page(offset, limit);
        self.open_db()?.list_outcoming(offset, limit)
    }

    pub fn get_outcoming(&self, id: i64) -> Result<OutcomingRecord, Error> {
        self.open_db()?
            .get_outcoming(id)?
            .ok_or(Error::NotFound { id })
    }

    pub fn update_tags(&self, id: i64, tags: &[String]) -> Result<OutcomingRecord, Error> {
        let db = self.open_db()?;
        db.update_tags(id, tags)?;
        db.get_outcoming(id)?.ok_or(Error::NotFound { id })
    }

    /// Wipes both ledgers. Files already copied stay on disk.
    pub fn clear_all(&self) -> Result<(), Error> {
        if self.tracker.is_active() {
            return Err(Error::ScanInProgress);
        }
        let db = self.open_db()?;
        crate::storage::retry::with_retry("clear_all", || db.clear_all())?;
        info!("Cleared incoming and outcoming records");
        Ok(())
    }
}

/// Negative offsets become 0; limits are clamped to `1..=MAX_PAGE_LIMIT`, with
/// non-positive limits meaning the default.
pub fn clamp_page(offset: i64, limit: i64) -> (i64, i64) {
    let limit = if limit <= 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT)
    };
    (offset.max(0), limit)
}

/// Handle to a background scan.
pub struct ScanHandle {
    finisher: JoinHandle<Result<ScanReport, Error>>,
    cancel: CancellationToken,
    tracker: Arc<ScanStatusTracker>,
}

impl ScanHandle {
    /// Requests cancellation. The file being processed finishes first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> Arc<ScanStatus> {
        self.tracker.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.finisher.is_finished()
    }

    pub fn wait(self) -> Result<ScanReport, Error> {
        self.finisher
            .join()
            .map_err(|_| Error::Other("scan coordinator panicked".to_string()))?
    }
}

struct ScanJob {
    request: ScanRequest,
    ignore_patterns: Vec<String>,
    queue_capacity: usize,
    thumbnail_max_dim: u32,
    tracker: Arc<ScanStatusTracker>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

/// What the walk thread gives back when it ends.
struct WalkOutcome {
    db: Database,
    retired: Vec<i64>,
    result: Result<(), Error>,
}

impl ScanJob {
    /// Walk and drain run concurrently over a bounded queue; once both are
    /// done the retired incoming ids are deleted in one batch and the
    /// connection is released.
    fn run(self, db: Database) -> Result<ScanReport, Error> {
        let started = Instant::now();
        self.reporter
            .on_scan_start(&self.request.source_root.to_string_lossy());

        let (retired_incoming, failures, result) = self
            .walk_and_drain(db)
            .unwrap_or_else(|e| (0, Vec::new(), Err(e)));

        match &result {
            Ok(()) => self.tracker.finish(ScanState::Completed, None),
            Err(Error::Cancelled) => self
                .tracker
                .finish(ScanState::Cancelled, Some(Error::Cancelled.to_string())),
            Err(e) => {
                error!("Scan aborted: {}", e);
                self.tracker.finish(ScanState::Error, Some(e.to_string()));
            }
        }

        let status = ScanStatus::clone(&self.tracker.snapshot());
        self.reporter.on_scan_complete(&status);
        info!(
            "Scan finished as {:?}: {} copied, {} skipped, {} failed in {:.2}s",
            status.status,
            status.copied,
            status.skipped,
            status.failed,
            started.elapsed().as_secs_f64()
        );

        result?;
        Ok(ScanReport {
            status,
            retired_incoming,
            failures,
            duration: started.elapsed(),
        })
    }

    /// Returns the number of retired incoming rows, the failures seen by the
    /// drain side, and how the walk ended.
    fn walk_and_drain(
        &self,
        db: Database,
    ) -> Result<(usize, Vec<FailedFile>, Result<(), Error>), Error> {
        let (tx, rx) = mpsc::sync_channel::<IngestedFile>(self.queue_capacity);

        let walk_handle = {
            let request = self.request.clone();
            let ignore_patterns = self.ignore_patterns.clone();
            let thumbnail_max_dim = self.thumbnail_max_dim;
            let cancel = self.cancel.clone();
            thread::Builder::new()
                .name("scan-walk".into())
                .spawn(move || {
                    walk_and_ingest(db, &request, &ignore_patterns, thumbnail_max_dim, &cancel, tx)
                })?
        };

        let drain_handle = {
            let tracker = Arc::clone(&self.tracker);
            let reporter = Arc::clone(&self.reporter);
            thread::Builder::new()
                .name("scan-drain".into())
                .spawn(move || drain(rx, &tracker, reporter.as_ref()))
        };
        let drain_handle = match drain_handle {
            Ok(handle) => handle,
            Err(e) => {
                // The walk sees a closed queue and stops on its own.
                let _ = walk_handle.join();
                return Err(e.into());
            }
        };

        let walk = walk_handle
            .join()
            .map_err(|_| Error::Other("walk thread panicked".to_string()));
        let failures = drain_handle.join().unwrap_or_else(|_| {
            error!("Drain thread panicked");
            Vec::new()
        });

        let WalkOutcome {
            db,
            retired,
            result,
        } = walk?;

        let retired_incoming = match db.delete_incoming(&retired) {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to delete retired incoming records: {}", e);
                0
            }
        };
        drop(db);
        Ok((retired_incoming, failures, result))
    }
}

fn walk_and_ingest(
    db: Database,
    request: &ScanRequest,
    ignore_patterns: &[String],
    thumbnail_max_dim: u32,
    cancel: &CancellationToken,
    tx: SyncSender<IngestedFile>,
) -> WalkOutcome {
    let mut retired = Vec::new();
    let result = (|| {
        let mut walker =
            Walker::new(&request.source_root).with_ignore_patterns(ignore_patterns);
        if config::dest_within_source(&request.source_root, &request.dest_root) {
            walker = walker.excluding(&request.dest_root);
        }
        let pipeline = IngestPipeline::new(&db, &request.dest_root, thumbnail_max_dim);

        for entry in walker.entries() {
            if cancel.is_cancelled() {
                warn!("Scan cancelled, stopping walk");
                return Err(Error::Cancelled);
            }
            let entry = entry?;
            if entry.is_dir {
                continue;
            }

            let ingested = match pipeline.process_file(&entry) {
                Ok(file) => file,
                Err(e) => {
                    error!("{}", e);
                    IngestedFile::failed(&entry, pipeline.destination_for(&entry), e.to_string())
                }
            };
            if let Some(id) = ingested.retire_id() {
                retired.push(id);
            }
            if tx.send(ingested).is_err() {
                return Err(Error::Other("status drain stopped early".to_string()));
            }
        }
        Ok(())
    })();

    WalkOutcome {
        db,
        retired,
        result,
    }
}

fn drain(
    rx: Receiver<IngestedFile>,
    tracker: &ScanStatusTracker,
    reporter: &dyn ProgressReporter,
) -> Vec<FailedFile> {
    let mut failures = Vec::new();
    for file in rx {
        tracker.record(&file.name, &file.outcome);
        reporter.on_file_processed(&file.name, &file.outcome, &tracker.snapshot());
        match &file.outcome {
            FileOutcome::Failed(reason) => failures.push(FailedFile {
                src_path: file.src_path,
                reason: reason.clone(),
            }),
            outcome => debug!("{} -> {:?}", file.src_path.display(), outcome),
        }
    }
    failures
}
