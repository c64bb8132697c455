use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use crate::{error::Result, models::session::Session};

/// Stores a new session.
///
/// # Returns
///
/// `false` if the token already exists; nothing is written in that case.
pub async fn insert_session(
    pool: &Pool,
    token: &str,
    user_id: i32,
    expiry: DateTime<Utc>,
) -> Result<bool> {
    let client = pool.get().await?;
    let inserted = client
        .execute(
            r#"
            INSERT INTO sessions (token, user_id, expiry)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO NOTHING
            "#,
            &[&token, &user_id, &expiry],
        )
        .await?;
    Ok(inserted == 1)
}

/// Slides the expiry of a live session.
///
/// Only rows still live at `now` are touched, so a row deleted by a concurrent
/// purge stays deleted.
///
/// # Returns
///
/// The owning user ID if the session was live.
pub async fn renew_session(
    pool: &Pool,
    token: &str,
    now: DateTime<Utc>,
    new_expiry: DateTime<Utc>,
) -> Result<Option<i32>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            UPDATE sessions
            SET expiry = $3
            WHERE token = $1 AND expiry > $2
            RETURNING user_id
            "#,
            &[&token, &now, &new_expiry],
        )
        .await?;
    Ok(row.map(|r| r.get("user_id")))
}

/// Deletes a session if it is expired at `now`.
pub async fn delete_if_expired(pool: &Pool, token: &str, now: DateTime<Utc>) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute(
            "DELETE FROM sessions WHERE token = $1 AND expiry <= $2",
            &[&token, &now],
        )
        .await?;
    Ok(deleted > 0)
}

/// Deletes a session unconditionally.
pub async fn delete_session(pool: &Pool, token: &str) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute("DELETE FROM sessions WHERE token = $1", &[&token])
        .await?;
    Ok(deleted > 0)
}

/// Deletes every session expired at `now`.
pub async fn delete_expired(pool: &Pool, now: DateTime<Utc>) -> Result<u64> {
    let client = pool.get().await?;
    let deleted = client
        .execute("DELETE FROM sessions WHERE expiry <= $1", &[&now])
        .await?;
    Ok(deleted)
}

/// Finds a session by its token.
pub async fn find_session(pool: &Pool, token: &str) -> Result<Option<Session>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT token, user_id, expiry FROM sessions WHERE token = $1",
            &[&token],
        )
        .await?;
    Ok(row.map(|r| Session {
        token: r.get("token"),
        user_id: r.get("user_id"),
        expiry: r.get("expiry"),
    }))
}
