use chrono::{DateTime, Utc};

/// Represents a user in the system.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: i32,
    /// The user's username, trimmed and lower-cased.
    pub username: String,
    /// The user's bcrypt password hash.
    pub password_hash: String,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}
