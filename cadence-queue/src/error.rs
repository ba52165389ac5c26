//! Error types for cadence-queue
//!
//! These never cross the `QueueService` boundary: the service logs them and
//! reports a `SaveOutcome` or an empty result instead.

use thiserror::Error;

/// Main error type for the queue crate
#[derive(Error, Debug)]
pub enum Error {
    /// Errors raised by cadence-common (config, database init)
    #[error(transparent)]
    Common(#[from] cadence_common::Error),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Runtime settings errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Queue state errors (corrupt rows, unknown queue)
    #[error("Queue error: {0}")]
    Queue(String),

    /// Programmer errors: non-positive ids, empty track ids
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when SQLite reported transient lock contention
    pub fn is_database_locked(&self) -> bool {
        match self {
            Error::Database(db_err) => {
                let message = db_err.to_string();
                message.contains("database is locked")
                    || message.contains("database table is locked")
            }
            Error::Common(common) => common.is_database_locked(),
            _ => false,
        }
    }
}

/// Convenience Result type using the queue Error
pub type Result<T> = std::result::Result<T, Error>;
