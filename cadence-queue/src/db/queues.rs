//! Queue metadata database operations
//!
//! CRUD over the `queues` table: one row per profile holding the current
//! position, shuffle flag and repeat mode.

use crate::error::Result;
use cadence_common::db::{QueueMetadata, QueueRecord, RepeatMode};
use cadence_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

fn record_from_row(row: &SqliteRow) -> Result<QueueRecord> {
    let repeat_mode: String = row.try_get("repeat_mode")?;
    let last_modified: String = row.try_get("last_modified")?;

    Ok(QueueRecord {
        queue_id: row.try_get("queue_id")?,
        profile_id: row.try_get("profile_id")?,
        current_track_order: row.try_get("current_track_order")?,
        is_shuffled: row.try_get("is_shuffled")?,
        repeat_mode: repeat_mode.parse()?,
        last_modified: time::parse_storage(&last_modified)?,
    })
}

/// Get the queue owned by a profile
pub async fn get_by_profile<'e, E>(executor: E, profile_id: i64) -> Result<Option<QueueRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT queue_id, profile_id, current_track_order, is_shuffled,
               repeat_mode, last_modified
        FROM queues
        WHERE profile_id = ?
        "#,
    )
    .bind(profile_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Get a queue by its id
pub async fn get_by_id<'e, E>(executor: E, queue_id: i64) -> Result<Option<QueueRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT queue_id, profile_id, current_track_order, is_shuffled,
               repeat_mode, last_modified
        FROM queues
        WHERE queue_id = ?
        "#,
    )
    .bind(queue_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Create the queue row for a profile and return its id
///
/// Fails with a unique-constraint error if the profile already has a queue.
pub async fn create<'e, E>(executor: E, profile_id: i64, metadata: &QueueMetadata) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO queues (
            profile_id, current_track_order, is_shuffled, repeat_mode, last_modified
        ) VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile_id)
    .bind(metadata.current_track_order)
    .bind(metadata.is_shuffled)
    .bind(metadata.repeat_mode.as_str())
    .bind(time::to_storage(&time::now()))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Update position, shuffle flag and repeat mode
///
/// Returns false if the queue no longer exists.
pub async fn update_metadata<'e, E>(
    executor: E,
    queue_id: i64,
    metadata: &QueueMetadata,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE queues
        SET current_track_order = ?, is_shuffled = ?, repeat_mode = ?, last_modified = ?
        WHERE queue_id = ?
        "#,
    )
    .bind(metadata.current_track_order)
    .bind(metadata.is_shuffled)
    .bind(metadata.repeat_mode.as_str())
    .bind(time::to_storage(&time::now()))
    .bind(queue_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Update position and shuffle flag, leaving repeat mode as stored
///
/// Returns false if the queue no longer exists.
pub async fn update_position<'e, E>(
    executor: E,
    queue_id: i64,
    current_track_order: i64,
    is_shuffled: bool,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE queues
        SET current_track_order = ?, is_shuffled = ?, last_modified = ?
        WHERE queue_id = ?
        "#,
    )
    .bind(current_track_order)
    .bind(is_shuffled)
    .bind(time::to_storage(&time::now()))
    .bind(queue_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Update only the repeat mode
pub async fn update_repeat_mode<'e, E>(
    executor: E,
    queue_id: i64,
    repeat_mode: RepeatMode,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result =
        sqlx::query("UPDATE queues SET repeat_mode = ?, last_modified = ? WHERE queue_id = ?")
            .bind(repeat_mode.as_str())
            .bind(time::to_storage(&time::now()))
            .bind(queue_id)
            .execute(executor)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Reset metadata to defaults (index 0, unshuffled, repeat none)
pub async fn reset_metadata<'e, E>(executor: E, queue_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    update_metadata(executor, queue_id, &QueueMetadata::default()).await
}

/// Delete a queue row; its tracks cascade
pub async fn delete<'e, E>(executor: E, queue_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM queues WHERE queue_id = ?")
        .bind(queue_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::db::init_in_memory_database;
    use cadence_common::db::profiles::create_profile;
    use sqlx::SqlitePool;

    async fn setup() -> (SqlitePool, i64) {
        let pool = init_in_memory_database().await.unwrap();
        let profile_id = create_profile(&pool, "test").await.unwrap();
        (pool, profile_id)
    }

    #[tokio::test]
    async fn test_get_by_profile_missing() {
        let (pool, profile_id) = setup().await;
        assert!(get_by_profile(&pool, profile_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let (pool, profile_id) = setup().await;
        let meta = QueueMetadata {
            current_track_order: 3,
            is_shuffled: true,
            repeat_mode: RepeatMode::All,
        };

        let queue_id = create(&pool, profile_id, &meta).await.unwrap();
        let record = get_by_profile(&pool, profile_id).await.unwrap().unwrap();

        assert_eq!(record.queue_id, queue_id);
        assert_eq!(record.profile_id, profile_id);
        assert_eq!(record.metadata(), meta);
        assert_eq!(get_by_id(&pool, queue_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_one_queue_per_profile() {
        let (pool, profile_id) = setup().await;
        create(&pool, profile_id, &QueueMetadata::default()).await.unwrap();

        let second = create(&pool, profile_id, &QueueMetadata::default()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_update_metadata_and_repeat_mode() {
        let (pool, profile_id) = setup().await;
        let queue_id = create(&pool, profile_id, &QueueMetadata::default())
            .await
            .unwrap();
        let before = get_by_id(&pool, queue_id).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let meta = QueueMetadata {
            current_track_order: 7,
            is_shuffled: true,
            repeat_mode: RepeatMode::One,
        };
        assert!(update_metadata(&pool, queue_id, &meta).await.unwrap());
        assert!(update_repeat_mode(&pool, queue_id, RepeatMode::All).await.unwrap());

        let after = get_by_id(&pool, queue_id).await.unwrap().unwrap();
        assert_eq!(after.current_track_order, 7);
        assert!(after.is_shuffled);
        assert_eq!(after.repeat_mode, RepeatMode::All);
        assert!(after.last_modified > before.last_modified);
    }

    #[tokio::test]
    async fn test_update_position_keeps_repeat_mode() {
        let (pool, profile_id) = setup().await;
        let meta = QueueMetadata {
            current_track_order: 0,
            is_shuffled: false,
            repeat_mode: RepeatMode::One,
        };
        let queue_id = create(&pool, profile_id, &meta).await.unwrap();

        assert!(update_position(&pool, queue_id, 2, true).await.unwrap());

        let record = get_by_id(&pool, queue_id).await.unwrap().unwrap();
        assert_eq!(record.current_track_order, 2);
        assert!(record.is_shuffled);
        assert_eq!(record.repeat_mode, RepeatMode::One);
    }

    #[tokio::test]
    async fn test_updates_on_missing_queue_report_false() {
        let (pool, _) = setup().await;
        assert!(!update_metadata(&pool, 999, &QueueMetadata::default()).await.unwrap());
        assert!(!update_position(&pool, 999, 1, false).await.unwrap());
        assert!(!update_repeat_mode(&pool, 999, RepeatMode::One).await.unwrap());
        assert!(!delete(&pool, 999).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_metadata() {
        let (pool, profile_id) = setup().await;
        let meta = QueueMetadata {
            current_track_order: 4,
            is_shuffled: true,
            repeat_mode: RepeatMode::One,
        };
        let queue_id = create(&pool, profile_id, &meta).await.unwrap();

        assert!(reset_metadata(&pool, queue_id).await.unwrap());
        let record = get_by_id(&pool, queue_id).await.unwrap().unwrap();
        assert_eq!(record.metadata(), QueueMetadata::default());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, profile_id) = setup().await;
        let queue_id = create(&pool, profile_id, &QueueMetadata::default()).await.unwrap();

        assert!(delete(&pool, queue_id).await.unwrap());
        assert!(get_by_profile(&pool, profile_id).await.unwrap().is_none());
    }
}
