use crate::error::Error;
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error};
use walkdir::{DirEntry, WalkDir};

/// A regular file or directory seen by the walk.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub modified: SystemTime,
    pub size: u64,
}

/// Sequential, lexically ordered directory traversal.
///
/// Errors below the root are logged and only cost the affected subtree. A
/// failure on the root itself is yielded as `Error::Walk` and ends the walk.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    ignore_patterns: Vec<Pattern>,
    excluded: Option<PathBuf>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            ignore_patterns: Vec::new(),
            excluded: None,
        }
    }

    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    /// Prunes `dir` and everything below it.
    pub fn excluding(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.excluded = Some(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> impl Iterator<Item = Result<WalkEntry, Error>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| self.keep(entry))
            .filter_map(move |result| match result {
                Ok(entry) => self.to_walk_entry(&entry),
                Err(err) if err.depth() == 0 => Some(Err(Error::Walk {
                    root: self.root.clone(),
                    source: err,
                })),
                Err(err) => {
                    error!("Skipping unreadable entry under {}: {}", self.root.display(), err);
                    None
                }
            })
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let path = entry.path();
        if let Some(excluded) = &self.excluded {
            if path.starts_with(excluded) {
                debug!("Skipping destination subtree {}", path.display());
                return false;
            }
        }
        !self
            .ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn to_walk_entry(&self, entry: &DirEntry) -> Option<Result<WalkEntry, Error>> {
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!("Skipping symlink {}", entry.path().display());
            return None;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                error!("Error getting metadata for {}: {}", entry.path().display(), e);
                return None;
            }
        };
        Some(Ok(WalkEntry {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: file_type.is_dir(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file_names(walker: &Walker) -> Vec<String> {
        walker
            .entries()
            .map(|e| e.unwrap())
            .filter(|e| !e.is_dir)
            .map(|e| e.name)
            .collect()
    }

    #[test]
    fn test_lexical_order_and_directories_reported() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("b_dir")).unwrap();
        fs::write(tmp.path().join("c.jpg"), "c").unwrap();
        fs::write(tmp.path().join("a.jpg"), "a").unwrap();
        fs::write(tmp.path().join("b_dir/inner.jpg"), "i").unwrap();

        let walker = Walker::new(tmp.path());
        assert_eq!(file_names(&walker), vec!["a.jpg", "inner.jpg", "c.jpg"]);
        assert!(walker.entries().any(|e| e.map(|e| e.is_dir).unwrap_or(false)));
    }

    #[test]
    fn test_ignore_patterns_prune_subtree() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("cache")).unwrap();
        fs::write(tmp.path().join("cache/x.jpg"), "x").unwrap();
        fs::write(tmp.path().join("keep.jpg"), "k").unwrap();

        let walker = Walker::new(tmp.path()).with_ignore_patterns(&["**/cache".to_string()]);
        assert_eq!(file_names(&walker), vec!["keep.jpg"]);
    }

    #[test]
    fn test_excluded_destination_is_skipped() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("sorted");
        fs::create_dir_all(dest.join("2020/May")).unwrap();
        fs::write(dest.join("2020/May/copy.jpg"), "c").unwrap();
        fs::write(tmp.path().join("orig.jpg"), "o").unwrap();

        let walker = Walker::new(tmp.path()).excluding(&dest);
        assert_eq!(file_names(&walker), vec!["orig.jpg"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let walker = Walker::new(tmp.path().join("missing"));
        let results: Vec<_> = walker.entries().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Walk { .. })));
    }
}
