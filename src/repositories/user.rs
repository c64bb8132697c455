use deadpool_postgres::Pool;
use tokio_postgres::Row;
use crate::{error::Result, models::user::User};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Creates a new user in the database.
///
/// The uniqueness check and the insert are a single statement.
///
/// # Returns
///
/// The new user's ID, or `None` if the username is already taken.
pub async fn create_user(pool: &Pool, username: &str, password_hash: &str) -> Result<Option<i32>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (username) DO NOTHING
            RETURNING id
            "#,
            &[&username, &password_hash],
        )
        .await?;
    Ok(row.map(|r| r.get("id")))
}

/// Finds a user by their normalized username.
pub async fn find_by_username(pool: &Pool, username: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
            &[&username],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Resolves a normalized username to its user ID.
pub async fn find_id_by_username(pool: &Pool, username: &str) -> Result<Option<i32>> {
    let client = pool.get().await?;
    let row = client
        .query_opt("SELECT id FROM users WHERE username = $1", &[&username])
        .await?;
    Ok(row.map(|r| r.get("id")))
}
