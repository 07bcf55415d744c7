use crate::media::FileCategory;
use serde::Serialize;

/// Provisional ledger row for a file discovered during a scan. One row per
/// content hash; retired once the file is committed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRecord {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub size: i64,
    pub modified_at: String,
    pub src_path: String,
    pub copied: bool,
    pub file_category: FileCategory,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Permanent catalog row for a file copied into the destination tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomingRecord {
    pub id: i64,
    pub name: String,
    pub size: i64,
    pub modified_at: String,
    pub src_path: String,
    pub dest_path: String,
    pub copied_at: String,
    pub hash: String,
    pub file_category: FileCategory,
    pub metadata: String,
    pub thumbnail_path: Option<String>,
    pub tags: Vec<String>,
}

/// Values written by `upsert_incoming`.
#[derive(Debug, Clone)]
pub struct NewIncoming {
    pub hash: String,
    pub name: String,
    pub size: i64,
    pub modified_at: String,
    pub src_path: String,
    pub copied: bool,
    pub file_category: FileCategory,
}

/// Values written by `insert_outcoming`.
#[derive(Debug, Clone)]
pub struct NewOutcoming {
    pub hash: String,
    pub name: String,
    pub size: i64,
    pub modified_at: String,
    pub src_path: String,
    pub dest_path: String,
    pub file_category: FileCategory,
    pub metadata: String,
    pub thumbnail_path: String,
    pub tags: Vec<String>,
}

/// Result of the dedup lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedCopy {
    pub id: i64,
    pub dest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}
