//! Database Retry Logic
//!
//! Exponential backoff for transient SQLite lock errors. Save actions run
//! under the coordinator's write lock, but other processes (or readers
//! upgrading to writers) can still hold the database briefly.

use crate::error::Result;
use std::time::{Duration, Instant};

/// Initial backoff between attempts
const INITIAL_BACKOFF_MS: u64 = 10;

/// Backoff ceiling
const MAX_BACKOFF_MS: u64 = 500;

/// Retry a database operation with exponential backoff until `max_wait`
/// elapses.
///
/// Only "database is locked" errors are retried; any other error is returned
/// immediately. The operation is re-run from scratch on each attempt, so it
/// must be a complete unit (typically a whole transaction).
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_database_locked() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();

                if elapsed >= max_wait {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms = max_wait.as_millis() as u64,
                        "Database still locked, giving up"
                    );
                    return Err(err);
                }

                let remaining_ms = max_wait.saturating_sub(elapsed).as_millis() as u64;
                let sleep_ms = backoff_ms.min(remaining_ms).max(1);

                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = sleep_ms,
                    "Database locked, retrying after backoff"
                );

                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
