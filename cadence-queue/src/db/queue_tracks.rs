//! Queue track database operations
//!
//! Rows of `queue_tracks` are never edited in place: structural changes
//! replace the whole list. `replace_all` is delete-then-insert, so it must run
//! inside a transaction for readers to never see an empty or partial list;
//! `replace_all_atomic` opens that transaction itself.

use crate::error::Result;
use cadence_common::db::QueueTrack;
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};

/// Get a queue's tracks ordered by `track_order`
pub async fn get_by_queue<'e, E>(executor: E, queue_id: i64) -> Result<Vec<QueueTrack>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT track_id, track_order, original_order
        FROM queue_tracks
        WHERE queue_id = ?
        ORDER BY track_order ASC
        "#,
    )
    .bind(queue_id)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| -> Result<QueueTrack> {
            Ok(QueueTrack {
                track_id: row.try_get("track_id")?,
                track_order: row.try_get("track_order")?,
                original_order: row.try_get("original_order")?,
            })
        })
        .collect()
}

/// Count a queue's tracks
pub async fn count_by_queue<'e, E>(executor: E, queue_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_tracks WHERE queue_id = ?")
        .bind(queue_id)
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Delete all tracks of a queue, returning how many were removed
pub async fn delete_by_queue<'e, E>(executor: E, queue_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM queue_tracks WHERE queue_id = ?")
        .bind(queue_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Insert tracks for a queue
pub async fn insert_all(
    conn: &mut SqliteConnection,
    queue_id: i64,
    tracks: &[QueueTrack],
) -> Result<()> {
    for track in tracks {
        sqlx::query(
            r#"
            INSERT INTO queue_tracks (queue_id, track_id, track_order, original_order)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(queue_id)
        .bind(&track.track_id)
        .bind(track.track_order)
        .bind(track.original_order)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Replace a queue's tracks on an existing connection or transaction
pub async fn replace_all(
    conn: &mut SqliteConnection,
    queue_id: i64,
    tracks: &[QueueTrack],
) -> Result<()> {
    let removed = delete_by_queue(&mut *conn, queue_id).await?;
    insert_all(conn, queue_id, tracks).await?;

    tracing::debug!(queue_id, removed, inserted = tracks.len(), "Replaced queue tracks");
    Ok(())
}

/// Replace a queue's tracks in a transaction of its own
pub async fn replace_all_atomic(
    pool: &SqlitePool,
    queue_id: i64,
    tracks: &[QueueTrack],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    replace_all(&mut *tx, queue_id, tracks).await?;
    tx.commit().await?;
    Ok(())
}
