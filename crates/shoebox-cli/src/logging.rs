use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "logs/shoebox.log";

/// Filter used when `TRACING_LEVEL` is unset. Each `-v` opens up both the
/// binary and the engine crate one level; dependencies stay at `warn`.
fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,shoebox=info,shoebox_core=info",
        1 => "warn,shoebox=debug,shoebox_core=debug",
        _ => "info,shoebox=trace,shoebox_core=trace",
    }
}

/// Splits `LOG_FILE_PATH` into the directory and file name the appender
/// wants. An empty value turns file logging off.
fn log_file_location(raw: &str) -> Option<(PathBuf, PathBuf)> {
    let path = Path::new(raw.trim());
    let file_name = path.file_name()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, PathBuf::from(file_name)))
}

/// Compact stderr logging plus an optional plain-text log file. Keep the
/// returned guard alive until exit so the file writer flushes.
pub fn init_logger(verbosity: u8) -> Option<WorkerGuard> {
    let directives =
        env::var("TRACING_LEVEL").unwrap_or_else(|_| default_directives(verbosity).to_string());
    let filter_layer = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let log_file = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (file_layer, guard) = match log_file_location(&log_file) {
        Some((dir, file_name)) => {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .compact()
                .with_target(verbosity > 0)
                .without_time(),
        )
        .with(file_layer)
        .with(filter_layer)
        .init();

    debug!("Logging with filter '{}'", directives);

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse_and_raise_engine_level() {
        for verbosity in 0..4 {
            assert!(EnvFilter::try_new(default_directives(verbosity)).is_ok());
        }
        assert!(default_directives(0).contains("shoebox_core=info"));
        assert!(default_directives(1).contains("shoebox_core=debug"));
        assert!(default_directives(7).contains("shoebox_core=trace"));
    }

    #[test]
    fn test_log_file_location() {
        assert_eq!(
            log_file_location("logs/shoebox.log"),
            Some((PathBuf::from("logs"), PathBuf::from("shoebox.log")))
        );
        assert_eq!(
            log_file_location("shoebox.log"),
            Some((PathBuf::from("."), PathBuf::from("shoebox.log")))
        );
        assert_eq!(log_file_location(""), None);
    }
}
