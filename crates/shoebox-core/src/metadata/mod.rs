//! Best-effort metadata extraction.
//!
//! [`build_metadata`] never fails: any decode or I/O problem collapses to the
//! empty JSON object so ingest is never blocked on metadata quality.

pub mod exif;
pub mod xmp;

use crate::media::FileCategory;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub use self::exif::{extract_exif, ExifData};
pub use self::xmp::find_xmp_packet;

pub const EMPTY_METADATA: &str = "{}";

#[derive(Debug, Serialize)]
struct XmpBlob<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    raw: &'a str,
}

/// Returns a JSON object describing `path`, or `"{}"`.
pub fn build_metadata(path: &Path) -> String {
    build_metadata_for(path, FileCategory::from_path(path))
}

pub fn build_metadata_for(path: &Path, category: FileCategory) -> String {
    let blob = match category {
        FileCategory::Image => exif_json(path),
        FileCategory::Video => xmp_json(path).or_else(|| exif_json(path)),
        FileCategory::Other => None,
    };
    blob.unwrap_or_else(|| EMPTY_METADATA.to_string())
}

fn exif_json(path: &Path) -> Option<String> {
    match extract_exif(path) {
        Ok(data) => serde_json::to_string(&data).ok(),
        Err(e) => {
            debug!("No EXIF for {}: {}", path.display(), e);
            None
        }
    }
}

fn xmp_json(path: &Path) -> Option<String> {
    match find_xmp_packet(path) {
        Ok(Some(raw)) => serde_json::to_string(&XmpBlob { kind: "xmp", raw: &raw }).ok(),
        Ok(None) => None,
        Err(e) => {
            debug!("XMP scan failed for {}: {}", path.display(), e);
            None
        }
    }
}
