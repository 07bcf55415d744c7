use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use image::{Rgb, RgbImage};
use shoebox_core::pipeline::IngestPipeline;
use shoebox_core::scanner::WalkEntry;
use shoebox_core::storage::Database;
use shoebox_core::{FileCategory, FileOutcome};
use tempfile::tempdir;

/// 2020-06-15T12:00:00Z
const FIXED_MTIME: u64 = 1_592_222_400;

fn write_photo(path: &Path, shade: u8) {
    RgbImage::from_pixel(64, 48, Rgb([shade, 100, 50]))
        .save(path)
        .unwrap();
    set_mtime(path);
}

fn set_mtime(path: &Path) {
    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(FIXED_MTIME);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

fn entry_for(path: &Path) -> WalkEntry {
    let metadata = fs::metadata(path).unwrap();
    WalkEntry {
        path: path.to_path_buf(),
        name: path.file_name().unwrap().to_string_lossy().into_owned(),
        is_dir: false,
        modified: metadata.modified().unwrap(),
        size: metadata.len(),
    }
}

#[test]
fn test_new_image_is_copied_and_committed() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_photo(&src.join("a.jpg"), 10);

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let entry = entry_for(&src.join("a.jpg"));
    let expected_dest = pipeline.destination_for(&entry);

    let file = pipeline.process_file(&entry).unwrap();
    assert_eq!(file.outcome, FileOutcome::Copied);
    assert_eq!(file.dest_path, expected_dest);
    assert_eq!(fs::read(&expected_dest).unwrap(), fs::read(src.join("a.jpg")).unwrap());
    assert!(file.retire_id().is_some());

    let record = db.get_outcoming(file.outcoming_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.file_category, FileCategory::Image);
    assert_eq!(record.dest_path, expected_dest.to_string_lossy());
    let thumb = record.thumbnail_path.unwrap();
    assert!(thumb.starts_with(".thumbnails/"));
    assert!(dest.join(&thumb).is_file());

    let incoming = db.get_incoming_by_hash(&record.hash).unwrap().unwrap();
    assert!(!incoming.copied);
    assert!(incoming.error.is_none());
}

#[test]
fn test_identical_content_is_copied_once() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_photo(&src.join("a.jpg"), 10);
    fs::copy(src.join("a.jpg"), src.join("b.jpg")).unwrap();
    set_mtime(&src.join("b.jpg"));

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);

    let first = pipeline.process_file(&entry_for(&src.join("a.jpg"))).unwrap();
    let b_entry = entry_for(&src.join("b.jpg"));
    let b_would_land = pipeline.destination_for(&b_entry);
    let second = pipeline.process_file(&b_entry).unwrap();

    assert_eq!(first.outcome, FileOutcome::Copied);
    assert_eq!(second.outcome, FileOutcome::Skipped);
    assert_eq!(second.outcoming_id, first.outcoming_id);
    assert_eq!(second.dest_path, first.dest_path);
    assert_eq!(second.incoming_id, first.incoming_id);
    assert!(!b_would_land.exists());

    let committed = db.list_outcoming(0, 50).unwrap();
    assert_eq!(committed.total, 1);
    assert!(committed.items[0].src_path.ends_with("a.jpg"));

    let incoming = db.get_incoming_by_hash(&committed.items[0].hash).unwrap().unwrap();
    assert_eq!(incoming.name, "b.jpg");
    assert!(incoming.copied);
}

#[test]
fn test_mkdir_failure_is_recorded_on_incoming() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_photo(&src.join("a.jpg"), 10);

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let entry = entry_for(&src.join("a.jpg"));

    // A regular file where the year directory should go.
    let year_dir = pipeline
        .destination_for(&entry)
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .to_path_buf();
    fs::create_dir_all(year_dir.parent().unwrap()).unwrap();
    fs::write(&year_dir, "not a directory").unwrap();

    let err = pipeline.process_file(&entry).unwrap_err();
    assert!(err.to_string().contains("mkdir failed"));

    assert_eq!(db.list_outcoming(0, 50).unwrap().total, 0);
    let incoming = db.list_incoming(0, 50).unwrap();
    assert_eq!(incoming.total, 1);
    assert!(!incoming.items[0].copied);
    assert!(incoming.items[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("mkdir failed"));
}

#[test]
fn test_retry_after_failure_clears_error() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_photo(&src.join("a.jpg"), 10);

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let entry = entry_for(&src.join("a.jpg"));
    let year_dir = pipeline
        .destination_for(&entry)
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .to_path_buf();
    fs::create_dir_all(year_dir.parent().unwrap()).unwrap();
    fs::write(&year_dir, "blocker").unwrap();
    assert!(pipeline.process_file(&entry).is_err());

    fs::remove_file(&year_dir).unwrap();
    let file = pipeline.process_file(&entry).unwrap();
    assert_eq!(file.outcome, FileOutcome::Copied);

    let incoming = db.list_incoming(0, 50).unwrap();
    assert_eq!(incoming.total, 1);
    assert!(incoming.items[0].error.is_none());
}

#[test]
fn test_unknown_extension_is_copied_without_thumbnail() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("notes.txt"), "hello").unwrap();
    set_mtime(&src.join("notes.txt"));

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let file = pipeline.process_file(&entry_for(&src.join("notes.txt"))).unwrap();
    assert_eq!(file.outcome, FileOutcome::Copied);
    assert!(file.thumbnail_path.is_empty());

    let record = db.get_outcoming(file.outcoming_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.file_category, FileCategory::Other);
    assert_eq!(record.metadata, "{}");
    assert!(record.thumbnail_path.is_none());
    assert!(!dest.join(".thumbnails").exists());
}

#[test]
fn test_corrupt_image_still_copies() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("broken.jpg"), b"definitely not a jpeg").unwrap();
    set_mtime(&src.join("broken.jpg"));

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let file = pipeline.process_file(&entry_for(&src.join("broken.jpg"))).unwrap();

    assert_eq!(file.outcome, FileOutcome::Copied);
    assert!(file.thumbnail_path.is_empty());
    assert!(file.dest_path.is_file());
    let record = db.get_outcoming(file.outcoming_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.metadata, "{}");
}

#[test]
fn test_same_name_different_content_keeps_first_copy() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(src.join("one")).unwrap();
    fs::create_dir_all(src.join("two")).unwrap();
    write_photo(&src.join("one/IMG.jpg"), 200);
    write_photo(&src.join("two/IMG.jpg"), 20);

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);

    let first = pipeline.process_file(&entry_for(&src.join("one/IMG.jpg"))).unwrap();
    assert_eq!(first.outcome, FileOutcome::Copied);
    let thumb = dest.join(&first.thumbnail_path);
    let thumb_bytes = fs::read(&thumb).unwrap();

    let err = pipeline
        .process_file(&entry_for(&src.join("two/IMG.jpg")))
        .unwrap_err();
    assert!(err.to_string().contains("create dst failed"));

    assert_eq!(
        fs::read(&first.dest_path).unwrap(),
        fs::read(src.join("one/IMG.jpg")).unwrap()
    );
    assert_eq!(fs::read(&thumb).unwrap(), thumb_bytes);
    assert_eq!(db.list_outcoming(0, 50).unwrap().total, 1);

    let incoming = db.list_incoming(0, 50).unwrap();
    assert_eq!(incoming.total, 2);
    let loser = incoming
        .items
        .iter()
        .find(|row| row.src_path.contains("two"))
        .unwrap();
    assert!(!loser.copied);
    assert!(loser.error.as_deref().unwrap().starts_with("create dst failed"));
}

#[test]
fn test_identical_file_left_at_destination_is_adopted() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_photo(&src.join("a.jpg"), 10);

    let db = Database::open_in_memory().unwrap();
    let pipeline = IngestPipeline::new(&db, &dest, 200);
    let entry = entry_for(&src.join("a.jpg"));

    // Copied on an earlier run that stopped before recording it.
    let landed = pipeline.destination_for(&entry);
    fs::create_dir_all(landed.parent().unwrap()).unwrap();
    fs::copy(src.join("a.jpg"), &landed).unwrap();

    let file = pipeline.process_file(&entry).unwrap();
    assert_eq!(file.outcome, FileOutcome::Copied);
    assert_eq!(file.dest_path, landed);
    assert_eq!(fs::read(&landed).unwrap(), fs::read(src.join("a.jpg")).unwrap());
    assert_eq!(db.list_outcoming(0, 50).unwrap().total, 1);
}
