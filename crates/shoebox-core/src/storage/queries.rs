use super::models::*;
use super::retry::with_retry;
use super::sqlite::Database;
use crate::error::Error;
use crate::media::FileCategory;
use rusqlite::{ffi, params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::debug;

pub const TAG_DELIMITER: char = ',';
/// Keeps each DELETE well under SQLite's bound-parameter limit.
const DELETE_CHUNK: usize = 500;

const INCOMING_COLUMNS: &str = "id, hash, name, size, modified_at, src_path, copied, file_type, \
     error, created_at, updated_at";

const OUTCOMING_COLUMNS: &str = "id, name, size, modified_at, src_path, dest_path, copied_at, hash, \
     file_type, metadata, IFNULL(thumbnail_path, ''), IFNULL(tags, '')";

impl Database {
    // ── Incoming ─────────────────────────────────────────────────

    /// Inserts or, when the hash already has a row, overwrites that row and
    /// clears its error. Returns the id bound to the hash afterwards.
    pub fn upsert_incoming(&self, file: &NewIncoming) -> Result<i64, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let id = with_retry("upsert_incoming", || {
            self.connection().execute(
                "INSERT INTO incoming \
                 (hash, name, size, modified_at, src_path, copied, file_type, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
                 ON CONFLICT(hash) DO UPDATE SET \
                     name = excluded.name, \
                     size = excluded.size, \
                     modified_at = excluded.modified_at, \
                     src_path = excluded.src_path, \
                     copied = excluded.copied, \
                     file_type = excluded.file_type, \
                     error = NULL, \
                     updated_at = excluded.updated_at",
                params![
                    file.hash,
                    file.name,
                    file.size,
                    file.modified_at,
                    file.src_path,
                    file.copied,
                    file.file_category.as_str(),
                    now,
                ],
            )?;
            self.connection().query_row(
                "SELECT id FROM incoming WHERE hash = ?1",
                params![file.hash],
                |row| row.get(0),
            )
        })?;
        debug!("Upserted incoming {} for {}", id, file.src_path);
        Ok(id)
    }

    pub fn mark_incoming_failed(&self, id: i64, reason: &str) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        with_retry("mark_incoming_failed", || {
            self.connection().execute(
                "UPDATE incoming SET copied = 0, error = ?1, updated_at = ?2 WHERE id = ?3",
                params![reason, now, id],
            )
        })?;
        Ok(())
    }

    /// Deletes the given ids in one transaction. Empty input performs no writes.
    pub fn delete_incoming(&self, ids: &[i64]) -> Result<usize, Error> {
        let unique: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(0);
        }

        let deleted = with_retry("delete_incoming", || {
            let tx = self.connection().unchecked_transaction()?;
            let mut deleted = 0;
            for chunk in unique.chunks(DELETE_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let sql = format!("DELETE FROM incoming WHERE id IN ({})", placeholders);
                deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
            }
            tx.commit()?;
            Ok(deleted)
        })?;
        debug!("Deleted {} incoming records", deleted);
        Ok(deleted)
    }

    pub fn get_incoming_by_hash(&self, hash: &str) -> Result<Option<IncomingRecord>, Error> {
        let sql = format!("SELECT {} FROM incoming WHERE hash = ?1", INCOMING_COLUMNS);
        Ok(self
            .connection()
            .query_row(&sql, params![hash], incoming_from_row)
            .optional()?)
    }

    pub fn list_incoming(&self, offset: i64, limit: i64) -> Result<Page<IncomingRecord>, Error> {
        let total: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM incoming", [], |row| row.get(0))?;
        let sql = format!(
            "SELECT {} FROM incoming ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            INCOMING_COLUMNS
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let items = stmt
            .query_map(params![limit, offset], incoming_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    // ── Outcoming ────────────────────────────────────────────────

    /// Dedup oracle. A miss is `Ok(None)`.
    pub fn find_outcoming_by_hash(&self, hash: &str) -> Result<Option<CommittedCopy>, Error> {
        Ok(self
            .connection()
            .query_row(
                "SELECT id, dest_path FROM outcoming WHERE hash = ?1 LIMIT 1",
                params![hash],
                |row| {
                    Ok(CommittedCopy {
                        id: row.get(0)?,
                        dest_path: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Permanent commit. A hash that is already committed yields
    /// `Error::DuplicateContent` rather than a generic database error.
    pub fn insert_outcoming(&self, file: &NewOutcoming) -> Result<i64, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let tags = join_tags(&file.tags);
        let result = with_retry("insert_outcoming", || {
            self.connection().execute(
                "INSERT INTO outcoming \
                 (name, size, modified_at, src_path, dest_path, copied_at, hash, file_type, \
                  metadata, thumbnail_path, tags) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    file.name,
                    file.size,
                    file.modified_at,
                    file.src_path,
                    file.dest_path,
                    now,
                    file.hash,
                    file.file_category.as_str(),
                    file.metadata,
                    file.thumbnail_path,
                    tags,
                ],
            )?;
            Ok(self.connection().last_insert_rowid())
        });

        match result {
            Ok(id) => {
                debug!("Committed outcoming {} -> {}", id, file.dest_path);
                Ok(id)
            }
            Err(Error::Database(rusqlite::Error::SqliteFailure(e, _)))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(Error::DuplicateContent {
                    hash: file.hash.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_outcoming(&self, id: i64) -> Result<Option<OutcomingRecord>, Error> {
        let sql = format!("SELECT {} FROM outcoming WHERE id = ?1", OUTCOMING_COLUMNS);
        Ok(self
            .connection()
            .query_row(&sql, params![id], outcoming_from_row)
            .optional()?)
    }

    pub fn list_outcoming(&self, offset: i64, limit: i64) -> Result<Page<OutcomingRecord>, Error> {
        let total: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM outcoming", [], |row| row.get(0))?;
        let sql = format!(
            "SELECT {} FROM outcoming ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            OUTCOMING_COLUMNS
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let items = stmt
            .query_map(params![limit, offset], outcoming_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    /// Replaces the whole tag set of one record.
    pub fn update_tags(&self, id: i64, tags: &[String]) -> Result<(), Error> {
        let tags = normalize_tags(tags)?;
        let joined = join_tags(&tags);
        let affected = with_retry("update_tags", || {
            self.connection().execute(
                "UPDATE outcoming SET tags = ?1 WHERE id = ?2",
                params![joined, id],
            )
        })?;
        if affected == 0 {
            return Err(Error::NotFound { id });
        }
        Ok(())
    }
}

/// Trims tags, drops empties and repeats (first occurrence wins), and rejects
/// the storage delimiter.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, Error> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.contains(TAG_DELIMITER) {
            return Err(Error::InvalidTag(tag.to_string()));
        }
        if seen.insert(tag.to_string()) {
            out.push(tag.to_string());
        }
    }
    Ok(out)
}

fn join_tags(tags: &[String]) -> String {
    tags.join(&TAG_DELIMITER.to_string())
}

fn split_tags(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(TAG_DELIMITER).map(str::to_string).collect()
}

fn category_from(raw: String) -> FileCategory {
    raw.parse().unwrap_or(FileCategory::Other)
}

fn incoming_from_row(row: &Row<'_>) -> rusqlite::Result<IncomingRecord> {
    Ok(IncomingRecord {
        id: row.get(0)?,
        hash: row.get(1)?,
        name: row.get(2)?,
        size: row.get(3)?,
        modified_at: row.get(4)?,
        src_path: row.get(5)?,
        copied: row.get(6)?,
        file_category: category_from(row.get(7)?),
        error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn outcoming_from_row(row: &Row<'_>) -> rusqlite::Result<OutcomingRecord> {
    let thumbnail_path: String = row.get(10)?;
    let tags: String = row.get(11)?;
    Ok(OutcomingRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        modified_at: row.get(3)?,
        src_path: row.get(4)?,
        dest_path: row.get(5)?,
        copied_at: row.get(6)?,
        hash: row.get(7)?,
        file_category: category_from(row.get(8)?),
        metadata: row.get(9)?,
        thumbnail_path: Some(thumbnail_path).filter(|p| !p.is_empty()),
        tags: split_tags(&tags),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(
            normalize_tags(&tags(&[" beach ", "", "family", "beach"])).unwrap(),
            tags(&["beach", "family"])
        );
    }

    #[test]
    fn test_normalize_rejects_delimiter() {
        assert!(matches!(
            normalize_tags(&tags(&["a,b"])),
            Err(Error::InvalidTag(t)) if t == "a,b"
        ));
    }

    #[test]
    fn test_split_empty_tags() {
        assert!(split_tags("").is_empty());
        assert_eq!(split_tags("a,b"), tags(&["a", "b"]));
    }
}
