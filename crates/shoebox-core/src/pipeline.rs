//! Per-file ingest state machine.
//!
//! Discovered → Hashed → DedupChecked → (Duplicate | New) → ThumbnailAttempted →
//! MetadataBuilt → DirectoryEnsured → Copied → OutcomingRecorded → queued for
//! retirement. Every failure is scoped to the file being processed, and a
//! committed destination file is never overwritten.

use crate::error::Error;
use crate::hasher;
use crate::media::FileCategory;
use crate::metadata;
use crate::scanner::WalkEntry;
use crate::status::FileOutcome;
use crate::storage::{Database, NewIncoming, NewOutcoming};
use crate::thumbnail::Thumbnailer;
use chrono::{DateTime, Local, TimeZone};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// `<dest_root>/<year>/<MonthName>/<file_name>` from the source mtime.
pub fn destination_path<Tz: TimeZone>(
    dest_root: &Path,
    modified: &DateTime<Tz>,
    file_name: &str,
) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    dest_root
        .join(modified.format("%Y").to_string())
        .join(modified.format("%B").to_string())
        .join(file_name)
}

/// What the walk hands to the drain side for one regular file.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub name: String,
    pub src_path: PathBuf,
    pub dest_path: PathBuf,
    pub hash: Option<String>,
    pub incoming_id: Option<i64>,
    pub outcoming_id: Option<i64>,
    pub thumbnail_path: String,
    pub outcome: FileOutcome,
}

impl IngestedFile {
    pub fn failed(entry: &WalkEntry, dest_path: PathBuf, reason: String) -> Self {
        Self {
            name: entry.name.clone(),
            src_path: entry.path.clone(),
            dest_path,
            hash: None,
            incoming_id: None,
            outcoming_id: None,
            thumbnail_path: String::new(),
            outcome: FileOutcome::Failed(reason),
        }
    }

    /// Incoming id to delete in the end-of-scan batch, if this file is done.
    pub fn retire_id(&self) -> Option<i64> {
        match self.outcome {
            FileOutcome::Copied | FileOutcome::Skipped => self.incoming_id,
            FileOutcome::Failed(_) => None,
        }
    }
}

pub struct IngestPipeline<'a> {
    db: &'a Database,
    dest_root: PathBuf,
    thumbnailer: Thumbnailer,
}

/// Outcome of the dedup check for one file.
pub(crate) enum Staged {
    Duplicate(IngestedFile),
    New(StagedCopy),
}

/// A new file with its side artifacts built, waiting to be placed and
/// committed.
pub(crate) struct StagedCopy {
    incoming: NewIncoming,
    incoming_id: i64,
    record: NewOutcoming,
    ingested: IngestedFile,
    /// Set once this run has created the destination file itself.
    created: bool,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(db: &'a Database, dest_root: impl Into<PathBuf>, thumbnail_max_dim: u32) -> Self {
        let dest_root = dest_root.into();
        Self {
            db,
            thumbnailer: Thumbnailer::new(&dest_root, thumbnail_max_dim),
            dest_root,
        }
    }

    pub fn destination_for(&self, entry: &WalkEntry) -> PathBuf {
        let modified: DateTime<Local> = entry.modified.into();
        destination_path(&self.dest_root, &modified, &entry.name)
    }

    /// Runs one regular file through the state machine. An `Err` means this
    /// file failed; the caller logs it and moves on.
    pub fn process_file(&self, entry: &WalkEntry) -> Result<IngestedFile, Error> {
        match self.stage(entry)? {
            Staged::Duplicate(file) => Ok(file),
            Staged::New(mut staged) => {
                self.place(&mut staged)?;
                self.commit(staged)
            }
        }
    }

    /// Hash, dedup check, incoming upsert and, for new content, thumbnail and
    /// metadata.
    pub(crate) fn stage(&self, entry: &WalkEntry) -> Result<Staged, Error> {
        let src_path = entry.path.as_path();
        let dest_path = self.destination_for(entry);
        let modified: DateTime<Local> = entry.modified.into();
        let category = FileCategory::from_path(src_path);

        let hash = hasher::hash_file(src_path)
            .map_err(|e| Error::file_failed(src_path, "hash", e))?;

        let existing = self.db.find_outcoming_by_hash(&hash)?;

        let incoming = NewIncoming {
            hash: hash.clone(),
            name: entry.name.clone(),
            size: entry.size as i64,
            modified_at: modified.to_rfc3339(),
            src_path: src_path.to_string_lossy().into_owned(),
            copied: existing.is_some(),
            file_category: category,
        };
        let incoming_id = self.db.upsert_incoming(&incoming)?;

        let mut ingested = IngestedFile {
            name: entry.name.clone(),
            src_path: src_path.to_path_buf(),
            dest_path: dest_path.clone(),
            hash: Some(hash.clone()),
            incoming_id: Some(incoming_id),
            outcoming_id: None,
            thumbnail_path: String::new(),
            outcome: FileOutcome::Skipped,
        };

        if let Some(copy) = existing {
            debug!(
                "Already ingested {} as {} (outcoming {})",
                src_path.display(),
                copy.dest_path,
                copy.id
            );
            ingested.dest_path = PathBuf::from(copy.dest_path);
            ingested.outcoming_id = Some(copy.id);
            return Ok(Staged::Duplicate(ingested));
        }

        // Source bytes are identical to the future destination copy.
        let thumbnail_path = self.thumbnailer.ensure_thumbnail(&dest_path, src_path);
        let metadata = metadata::build_metadata_for(src_path, category);

        let record = NewOutcoming {
            hash,
            name: entry.name.clone(),
            size: entry.size as i64,
            modified_at: incoming.modified_at.clone(),
            src_path: incoming.src_path.clone(),
            dest_path: dest_path.to_string_lossy().into_owned(),
            file_category: category,
            metadata,
            thumbnail_path,
            tags: Vec::new(),
        };

        Ok(Staged::New(StagedCopy {
            incoming,
            incoming_id,
            record,
            ingested,
            created: false,
        }))
    }

    /// Ensures the destination directory and writes the copy. The destination
    /// is never overwritten: a file already there is adopted when its content
    /// matches and fails this file otherwise.
    pub(crate) fn place(&self, staged: &mut StagedCopy) -> Result<(), Error> {
        let src_path = staged.ingested.src_path.clone();
        let dest_path = staged.ingested.dest_path.clone();

        if let Some(parent) = dest_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                self.fail(staged.incoming_id, format!("mkdir failed: {}", e));
                return Err(Error::file_failed(parent, "mkdir", e));
            }
        }

        match copy_file(&src_path, &dest_path) {
            Ok(_) => {
                staged.created = true;
                Ok(())
            }
            Err(("create dst", e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                let existing = hasher::hash_file(&dest_path).ok();
                if existing.as_deref() == Some(staged.record.hash.as_str()) {
                    debug!("Adopting identical file already at {}", dest_path.display());
                    return Ok(());
                }
                let reason = format!(
                    "{} already holds different content: {}",
                    dest_path.display(),
                    e
                );
                self.fail(staged.incoming_id, format!("create dst failed: {}", reason));
                Err(Error::file_failed(&src_path, "create dst", reason))
            }
            Err((stage, e)) => {
                self.fail(staged.incoming_id, format!("{} failed: {}", stage, e));
                Err(Error::file_failed(&src_path, stage, e))
            }
        }
    }

    /// Inserts the permanent record. Losing the insert to another writer of
    /// the same content turns this file into a dedup hit.
    pub(crate) fn commit(&self, staged: StagedCopy) -> Result<IngestedFile, Error> {
        let incoming_id = staged.incoming_id;
        match self.db.insert_outcoming(&staged.record) {
            Ok(id) => {
                info!(
                    "Copied {} -> {}",
                    staged.ingested.src_path.display(),
                    staged.ingested.dest_path.display()
                );
                let mut ingested = staged.ingested;
                ingested.outcoming_id = Some(id);
                ingested.thumbnail_path = staged.record.thumbnail_path;
                ingested.outcome = FileOutcome::Copied;
                Ok(ingested)
            }
            Err(Error::DuplicateContent { .. }) => self.yield_to_winner(staged).map_err(|e| {
                self.fail(incoming_id, format!("record failed: {}", e));
                e
            }),
            Err(e) => {
                self.fail(incoming_id, format!("record failed: {}", e));
                Err(e)
            }
        }
    }

    fn yield_to_winner(&self, staged: StagedCopy) -> Result<IngestedFile, Error> {
        let StagedCopy {
            mut incoming,
            record,
            mut ingested,
            created,
            ..
        } = staged;
        warn!(
            "Lost commit race for {}, treating as already ingested",
            ingested.src_path.display()
        );

        if created {
            remove_orphan(&ingested.dest_path);
            if !record.thumbnail_path.is_empty() {
                remove_orphan(&self.dest_root.join(&record.thumbnail_path));
            }
        }

        if let Some(winner) = self.db.find_outcoming_by_hash(&record.hash)? {
            ingested.dest_path = PathBuf::from(winner.dest_path);
            ingested.outcoming_id = Some(winner.id);
        }
        incoming.copied = true;
        self.db.upsert_incoming(&incoming)?;
        Ok(ingested)
    }

    fn fail(&self, incoming_id: i64, reason: String) {
        error!("Incoming {} failed: {}", incoming_id, reason);
        if let Err(e) = self.db.mark_incoming_failed(incoming_id, &reason) {
            error!("Could not record failure for incoming {}: {}", incoming_id, e);
        }
    }
}

fn remove_orphan(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Could not remove orphan {}: {}", path.display(), e);
    }
}

/// Streams `src` into a new file at `dst`. The error names the step that
/// failed; a partial copy is removed.
fn copy_file(src: &Path, dst: &Path) -> Result<u64, (&'static str, io::Error)> {
    let mut reader = File::open(src).map_err(|e| ("open src", e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .map_err(|e| ("create dst", e))?;
    let copied = io::copy(&mut reader, &mut writer).and_then(|n| writer.sync_all().map(|_| n));
    match copied {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(dst);
            Err(("copy", e))
        }
    }
}
