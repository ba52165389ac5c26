//! Database Test Utilities
//!
//! File-backed test databases, so the pool behaves like production (WAL,
//! several connections) rather than the single-connection in-memory pool.

use anyhow::Result;
use cadence_common::db::init_database;
use cadence_common::db::profiles::create_profile;
use cadence_queue::{QueueSaveCoordinator, QueueSaveSettings, QueueService};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Create temporary test database with the schema applied and one profile
///
/// Returns (TempDir, SqlitePool, profile_id) - TempDir must be kept alive for
/// duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool, i64)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_cadence.db");

    let pool = init_database(&db_path).await?;
    let profile_id = create_profile(&pool, "listener").await?;

    Ok((temp_dir, pool, profile_id))
}

/// Build a service with a short debounce window for tests
pub fn create_test_service(pool: SqlitePool, debounce: Duration) -> QueueService {
    let settings = QueueSaveSettings::default().with_metadata_debounce(debounce);
    let coordinator = Arc::new(QueueSaveCoordinator::new(settings.metadata_debounce));
    QueueService::new(pool, coordinator, settings)
}

/// Owned track ids from string literals
pub fn track_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_db() {
        let (_dir, pool, profile_id) = create_test_db().await.unwrap();
        assert!(profile_id > 0);

        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert!(tables.contains(&"queues".to_string()));
        assert!(tables.contains(&"queue_tracks".to_string()));
    }
}
