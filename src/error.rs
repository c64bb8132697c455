use axum::{
    extract::multipart::MultipartError,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// No connection could be checked out of the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built from the configuration.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A password hashing error.
    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// Missing or invalid credentials or session token.
    #[error("Authentication failed")]
    Unauthorized,

    /// The caller does not own the asset it tried to mutate.
    #[error("Video {0} belongs to another user")]
    Forbidden(Uuid),

    /// The username is empty or already taken.
    #[error("This user already exists")]
    Conflict,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A multipart error.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// A plaintext request reached a deployment that requires TLS.
    #[error("TLS required")]
    UpgradeRequired,

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::Multipart(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "File system error".to_string())
            }

            AppError::Hash(ref e) => {
                tracing::error!("Password hashing error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }

            // Ownership violations surface as plain 401s, like any other auth failure.
            AppError::Forbidden(id) => {
                tracing::warn!("Ownership check failed for video {}", id);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }

            AppError::Conflict => {
                tracing::debug!("Username conflict");
                (StatusCode::CONFLICT, "This user already exists".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "File Not Found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Multipart(ref msg) => {
                tracing::debug!("Multipart error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::UpgradeRequired => {
                tracing::debug!("Plaintext request rejected");
                let body = error_body("TLS required");
                return (
                    StatusCode::UPGRADE_REQUIRED,
                    [
                        (header::UPGRADE, HeaderValue::from_static("TLS/1.2, HTTP/1.1")),
                        (header::CONNECTION, HeaderValue::from_static("Upgrade")),
                        (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                    ],
                    body,
                )
                    .into_response();
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            error_body(&message),
        )
            .into_response()
    }
}

fn error_body(message: &str) -> String {
    sonic_rs::to_string(&sonic_rs::json!({
        "error": message
    }))
    .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_expected_status() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden(Uuid::nil()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Conflict.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire at /srv/x");
        let response = AppError::from(io).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upgrade_required_carries_upgrade_header() {
        let response = AppError::UpgradeRequired.into_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert!(response.headers().contains_key(header::UPGRADE));
    }
}
