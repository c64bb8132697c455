use chrono::{DateTime, Utc};

/// A persisted session row.
#[derive(Debug, Clone)]
pub struct Session {
    /// The opaque token presented by the client.
    pub token: String,
    /// The ID of the user this session belongs to.
    pub user_id: i32,
    /// The moment the session stops being valid unless renewed first.
    pub expiry: DateTime<Utc>,
}

/// The caller identity attached to a request by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// The token the caller presented.
    pub token: String,
    /// The user the token resolved to.
    pub user_id: i32,
}
