use crate::error::Error;
use rusqlite::ErrorCode;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;
pub const BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Lock contention reported by the engine, as opposed to a real failure.
pub fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Runs `f`, retrying transient failures with a linear backoff of
/// `BACKOFF_STEP * retry`. Non-transient errors are returned immediately.
pub fn with_retry<T, F>(op: &'static str, mut f: F) -> Result<T, Error>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let mut retry = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                if retry == MAX_RETRIES {
                    return Err(Error::StoreBusy {
                        op,
                        attempts: retry + 1,
                        source: e,
                    });
                }
                retry += 1;
                warn!("{} hit a busy database, retry {}/{}", op, retry, MAX_RETRIES);
                thread::sleep(BACKOFF_STEP * retry);
            }
            Err(e) => return Err(Error::Database(e)),
        }
    }
}
