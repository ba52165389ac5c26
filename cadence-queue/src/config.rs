//! Runtime settings for queue saves
//!
//! Loaded from the `settings` table. Missing or NULL values fall back to the
//! built-in defaults below and the default is written back, so the table
//! always documents the values in effect.

use crate::db::settings::{get_setting, set_setting};
use crate::error::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

pub const METADATA_DEBOUNCE_KEY: &str = "queue_metadata_debounce_ms";
pub const SHUTDOWN_FLUSH_TIMEOUT_KEY: &str = "queue_shutdown_flush_timeout_ms";
pub const MAX_LOCK_WAIT_KEY: &str = "queue_max_lock_wait_ms";

const DEFAULT_METADATA_DEBOUNCE_MS: u64 = 500;
const DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_MS: u64 = 300;
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 2000;

/// Upper bound for the debounce window; anything longer is clamped
const MAX_METADATA_DEBOUNCE_MS: u64 = 10_000;

/// Timing used by `QueueSaveCoordinator` and the save actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSaveSettings {
    /// Quiet window that collapses repeated metadata saves
    pub metadata_debounce: Duration,
    /// How long a shutdown flush waits for the write lock
    pub shutdown_flush_timeout: Duration,
    /// Total time a save action retries on SQLite lock contention
    pub max_lock_wait: Duration,
}

impl Default for QueueSaveSettings {
    fn default() -> Self {
        Self {
            metadata_debounce: Duration::from_millis(DEFAULT_METADATA_DEBOUNCE_MS),
            shutdown_flush_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_MS),
            max_lock_wait: Duration::from_millis(DEFAULT_MAX_LOCK_WAIT_MS),
        }
    }
}

impl QueueSaveSettings {
    /// Load settings from the database, initializing missing values
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        async fn get_or_init(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
            match get_setting::<u64>(pool, key).await {
                Ok(Some(value)) => Ok(value),
                Ok(None) => {
                    info!("Setting '{}' not found in database, using default: {}", key, default);
                    set_setting(pool, key, default).await?;
                    Ok(default)
                }
                Err(e) => {
                    warn!("{}; using default {}", e, default);
                    Ok(default)
                }
            }
        }

        let debounce_ms =
            get_or_init(pool, METADATA_DEBOUNCE_KEY, DEFAULT_METADATA_DEBOUNCE_MS).await?;
        let flush_ms =
            get_or_init(pool, SHUTDOWN_FLUSH_TIMEOUT_KEY, DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_MS)
                .await?;
        let lock_wait_ms = get_or_init(pool, MAX_LOCK_WAIT_KEY, DEFAULT_MAX_LOCK_WAIT_MS).await?;

        if debounce_ms > MAX_METADATA_DEBOUNCE_MS {
            warn!(
                "{} = {} exceeds {} ms, clamping",
                METADATA_DEBOUNCE_KEY, debounce_ms, MAX_METADATA_DEBOUNCE_MS
            );
        }

        let settings = Self {
            metadata_debounce: Duration::from_millis(debounce_ms.min(MAX_METADATA_DEBOUNCE_MS)),
            shutdown_flush_timeout: Duration::from_millis(flush_ms),
            max_lock_wait: Duration::from_millis(lock_wait_ms),
        };

        info!(
            debounce_ms = settings.metadata_debounce.as_millis() as u64,
            flush_timeout_ms = flush_ms,
            max_lock_wait_ms = lock_wait_ms,
            "Loaded queue save settings"
        );
        Ok(settings)
    }

    /// Override the debounce window
    pub fn with_metadata_debounce(mut self, debounce: Duration) -> Self {
        self.metadata_debounce = debounce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::db::init_in_memory_database;

    #[test]
    fn test_defaults() {
        let settings = QueueSaveSettings::default();
        assert_eq!(settings.metadata_debounce, Duration::from_millis(500));
        assert_eq!(settings.shutdown_flush_timeout, Duration::from_millis(300));
        assert_eq!(settings.max_lock_wait, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_load_initializes_missing_settings() {
        let pool = init_in_memory_database().await.unwrap();

        let settings = QueueSaveSettings::load(&pool).await.unwrap();
        assert_eq!(settings, QueueSaveSettings::default());

        let stored: Option<u64> = get_setting(&pool, METADATA_DEBOUNCE_KEY).await.unwrap();
        assert_eq!(stored, Some(500));
    }

    #[tokio::test]
    async fn test_load_reads_stored_values() {
        let pool = init_in_memory_database().await.unwrap();
        set_setting(&pool, METADATA_DEBOUNCE_KEY, 120u64).await.unwrap();
        set_setting(&pool, SHUTDOWN_FLUSH_TIMEOUT_KEY, 900u64).await.unwrap();

        let settings = QueueSaveSettings::load(&pool).await.unwrap();
        assert_eq!(settings.metadata_debounce, Duration::from_millis(120));
        assert_eq!(settings.shutdown_flush_timeout, Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_invalid_value_falls_back_to_default() {
        let pool = init_in_memory_database().await.unwrap();
        set_setting(&pool, METADATA_DEBOUNCE_KEY, "fast").await.unwrap();

        let settings = QueueSaveSettings::load(&pool).await.unwrap();
        assert_eq!(settings.metadata_debounce, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_debounce_clamped() {
        let pool = init_in_memory_database().await.unwrap();
        set_setting(&pool, METADATA_DEBOUNCE_KEY, 60_000u64).await.unwrap();

        let settings = QueueSaveSettings::load(&pool).await.unwrap();
        assert_eq!(settings.metadata_debounce, Duration::from_millis(10_000));
    }
}
