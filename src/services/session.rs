use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::Pool;
use tokio::task::JoinHandle;

use crate::crypto::token::generate_session_token;
use crate::error::{AppError, Result};
use crate::repositories::session as session_repo;

/// How long a session stays valid after it was issued or last used.
pub const SESSION_WINDOW_SECS: i64 = 3600;

/// How many fresh tokens are tried before giving up on a collision streak.
const MAX_ISSUE_ATTEMPTS: usize = 5;

fn session_window() -> Duration {
    Duration::seconds(SESSION_WINDOW_SECS)
}

/// Issues a new session for `user_id`, valid for one window from now.
pub async fn issue(db: &Pool, user_id: i32) -> Result<String> {
    issue_at(db, user_id, Utc::now()).await
}

/// Issues a new session as if the current time were `now`.
///
/// A token that collides with an existing row is discarded and a new one is
/// drawn.
pub async fn issue_at(db: &Pool, user_id: i32, now: DateTime<Utc>) -> Result<String> {
    let expiry = now + session_window();
    for attempt in 1..=MAX_ISSUE_ATTEMPTS {
        let token = generate_session_token();
        if session_repo::insert_session(db, &token, user_id, expiry).await? {
            tracing::debug!("Session issued for user {}", user_id);
            return Ok(token);
        }
        tracing::warn!("Session token collision (attempt {})", attempt);
    }
    Err(AppError::Internal(
        "Could not generate a unique session token".to_string(),
    ))
}

/// Resolves a token to its user, sliding the expiry forward.
pub async fn validate(db: &Pool, token: &str) -> Result<Option<i32>> {
    validate_at(db, token, Utc::now()).await
}

/// Resolves a token as if the current time were `now`.
///
/// A live session is renewed to `now` plus one window. An expired session is
/// deleted and reported as invalid. Renewal never touches a deleted row.
pub async fn validate_at(db: &Pool, token: &str, now: DateTime<Utc>) -> Result<Option<i32>> {
    if let Some(user_id) = session_repo::renew_session(db, token, now, now + session_window()).await? {
        return Ok(Some(user_id));
    }

    if session_repo::delete_if_expired(db, token, now).await? {
        tracing::debug!("Expired session purged");
    }
    Ok(None)
}

/// Ends a session.
///
/// # Returns
///
/// `true` if the session existed.
pub async fn revoke(db: &Pool, token: &str) -> Result<bool> {
    session_repo::delete_session(db, token).await
}

/// Deletes every session expired at `now`.
pub async fn sweep_expired(db: &Pool, now: DateTime<Utc>) -> Result<u64> {
    session_repo::delete_expired(db, now).await
}

/// Starts the periodic expired-session sweep.
pub fn spawn_sweeper(db: Pool, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match sweep_expired(&db, Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!("🧹 Removed {} expired sessions", count),
                Err(e) => tracing::error!("Session sweep failed: {}", e),
            }
        }
    })
}
