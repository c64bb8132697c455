use crate::error::{AppError, Result};
use crate::repositories::user as user_repo;
use crate::validation::auth::normalize_username;
use deadpool_postgres::Pool;
use once_cell::sync::Lazy;
use zeroize::Zeroizing;

/// The bcrypt work factor for stored password hashes.
pub const BCRYPT_COST: u32 = 12;

/// A hash verified against when the username is unknown, so that unknown
/// users cost the same as wrong passwords.
static DECOY_HASH: Lazy<Option<String>> =
    Lazy::new(|| bcrypt::hash("vista-decoy-password", BCRYPT_COST).ok());

/// Computes the decoy hash ahead of the first login.
///
/// # Returns
///
/// Whether a decoy is available.
pub fn prepare_decoy() -> bool {
    Lazy::force(&DECOY_HASH).is_some()
}

/// Hashes a password with bcrypt.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the hashed password.
fn hash_password(password: &str) -> Result<String> {
    let hash = bcrypt::hash(password, BCRYPT_COST)?;
    tracing::debug!("Password hashed successfully with bcrypt");
    Ok(hash)
}

/// Verifies a password against a stored hash, or against the decoy when
/// there is none.
///
/// # Returns
///
/// `true` only when `stored` is present and matches.
pub fn verify_with_decoy(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) => match bcrypt::verify(password, hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Stored password hash is unusable: {}", e);
                false
            }
        },
        None => {
            match DECOY_HASH.as_deref() {
                Some(decoy) => {
                    let _ = bcrypt::verify(password, decoy);
                }
                None => {
                    let _ = bcrypt::hash(password, BCRYPT_COST);
                }
            }
            false
        }
    }
}

/// Runs CPU-bound bcrypt work off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))
}

/// Registers a new user.
///
/// # Arguments
///
/// * `db` - The database connection pool.
/// * `username` - The requested username, normalized before use.
/// * `password` - The user's password.
///
/// # Returns
///
/// The new user's ID. An empty or taken username is `AppError::Conflict`.
pub async fn register(db: &Pool, username: &str, password: &str) -> Result<i32> {
    let username = normalize_username(username).ok_or(AppError::Conflict)?;
    tracing::debug!("🔐 Registering user: {}", username);

    let password = Zeroizing::new(password.to_owned());
    let hashed_password = run_blocking(move || hash_password(&password)).await??;

    let user_id = user_repo::create_user(db, &username, &hashed_password)
        .await?
        .ok_or(AppError::Conflict)?;

    tracing::info!("✅ User created with ID: {}", user_id);
    Ok(user_id)
}

/// Authenticates a user.
///
/// # Returns
///
/// The user's ID when the credentials match, `None` otherwise.
pub async fn authenticate(db: &Pool, username: &str, password: &str) -> Result<Option<i32>> {
    let stored = match normalize_username(username) {
        Some(username) => user_repo::find_by_username(db, &username).await?,
        None => None,
    };

    let hash = stored.as_ref().map(|user| user.password_hash.clone());
    let password = Zeroizing::new(password.to_owned());
    let valid = run_blocking(move || verify_with_decoy(&password, hash.as_deref())).await?;

    match stored {
        Some(user) if valid => {
            tracing::info!("✅ User authenticated: {}", user.id);
            Ok(Some(user.id))
        }
        _ => {
            tracing::debug!("Authentication rejected");
            Ok(None)
        }
    }
}

/// Resolves a username to its user ID.
pub async fn find_user_id(db: &Pool, username: &str) -> Result<Option<i32>> {
    match normalize_username(username) {
        Some(username) => user_repo::find_id_by_username(db, &username).await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn mean_duration(samples: u32, f: impl Fn()) -> Duration {
        let start = Instant::now();
        for _ in 0..samples {
            f();
        }
        start.elapsed() / samples
    }

    #[test]
    fn test_decoy_uses_same_cost() {
        let decoy = DECOY_HASH.as_deref().unwrap();
        assert!(decoy.starts_with("$2b$12$"));
    }

    #[test]
    fn test_prepare_decoy() {
        assert!(prepare_decoy());
        assert!(Lazy::get(&DECOY_HASH).is_some());
    }

    #[test]
    fn test_verify_with_decoy() {
        let hash = hash_password("pw1").unwrap();
        assert!(verify_with_decoy("pw1", Some(&hash)));
        assert!(!verify_with_decoy("pw2", Some(&hash)));
        assert!(!verify_with_decoy("pw1", None));
        assert!(!verify_with_decoy("pw1", Some("not-a-bcrypt-hash")));
    }

    #[test]
    fn test_unknown_user_and_wrong_password_take_similar_time() {
        let hash = hash_password("correct horse").unwrap();
        prepare_decoy();

        let unknown = mean_duration(3, || {
            verify_with_decoy("guess", None);
        });
        let wrong = mean_duration(3, || {
            verify_with_decoy("guess", Some(&hash));
        });

        let ratio = unknown.as_secs_f64() / wrong.as_secs_f64();
        assert!(
            (0.5..2.0).contains(&ratio),
            "unknown={:?} wrong={:?}",
            unknown,
            wrong
        );
    }
}
