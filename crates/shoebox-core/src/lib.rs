pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod lifecycle;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod status;
pub mod storage;
pub mod thumbnail;

pub use config::AppConfig;
pub use engine::{Engine, ScanHandle, ScanReport, ScanRequest};
pub use error::Error;
pub use lifecycle::CancellationToken;
pub use media::FileCategory;
pub use progress::{ProgressReporter, SilentReporter};
pub use status::{FileOutcome, ScanState, ScanStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;
