use garde::Validate;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// bcrypt only looks at the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// The form fields posted to `/register` and `/login`.
#[derive(Deserialize, Validate)]
pub struct CredentialsForm {
    #[garde(skip)]
    #[serde(default)]
    pub username: String,
    #[garde(length(bytes, min = 1, max = 72))]
    #[serde(default)]
    pub password: String,
}

/// Normalizes a username for storage and lookup.
///
/// # Returns
///
/// The trimmed, lower-cased username, or `None` if nothing is left.
pub fn normalize_username(username: &str) -> Option<String> {
    let normalized = username.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

/// Validates a password against the hashing limits.
///
/// # Arguments
///
/// * `form` - The submitted credentials.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is acceptable.
pub fn validate_password(form: &CredentialsForm) -> Result<()> {
    form.validate()
        .map_err(|report| AppError::Validation(format!("Invalid password: {}", report)))
}
