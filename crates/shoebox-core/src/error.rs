use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store stayed locked for every attempt of the retry policy.
    #[error("Database busy during {op} after {attempts} attempts: {source}")]
    StoreBusy {
        op: &'static str,
        attempts: u32,
        source: rusqlite::Error,
    },

    /// Another writer already committed this content hash.
    #[error("Content {hash} is already committed")]
    DuplicateContent { hash: String },

    #[error("Record {id} not found")]
    NotFound { id: i64 },

    #[error("Invalid tag '{0}': tags may not contain ','")]
    InvalidTag(String),

    #[error("Destination {} is the source folder itself", .0.display())]
    DestinationIsSource(PathBuf),

    #[error("A scan is already running")]
    ScanInProgress,

    #[error("Failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        source: walkdir::Error,
    },

    #[error("{stage} failed for {}: {reason}", path.display())]
    FileFailed {
        path: PathBuf,
        stage: &'static str,
        reason: String,
    },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn file_failed(
        path: impl Into<PathBuf>,
        stage: &'static str,
        reason: impl ToString,
    ) -> Self {
        Error::FileFailed {
            path: path.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}
