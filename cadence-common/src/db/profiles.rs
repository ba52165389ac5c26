//! Profile rows
//!
//! Profiles are owned by the profile service; this module only provides what
//! the queue schema needs: a row to reference and deletion that cascades to
//! the profile's queue.

use crate::Result;
use sqlx::SqlitePool;

/// Insert a profile and return its id
pub async fn create_profile(pool: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO profiles (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Check whether a profile exists
pub async fn profile_exists(pool: &SqlitePool, profile_id: i64) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE profile_id = ?)")
            .bind(profile_id)
            .fetch_one(pool)
            .await?;

    Ok(exists)
}

/// Delete a profile; its queue and queue tracks cascade
///
/// Returns false if no such profile existed.
pub async fn delete_profile(pool: &SqlitePool, profile_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM profiles WHERE profile_id = ?")
        .bind(profile_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
