use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{
    crypto::token::is_well_formed,
    error::AppError,
    models::session::AuthSession,
    services::session as session_service,
    state::AppState,
};

/// The name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// The `token` query parameter accepted on authenticated routes.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}

/// Finds the presented token: bearer header, then cookie, then query string.
fn extract_session_token(headers: &HeaderMap, cookies: &Cookies, query: TokenQuery) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookies.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .or(query.token)
}

/// A middleware that requires a valid session to be present.
///
/// On success the session is renewed and an [`AuthSession`] is attached to the
/// request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<TokenQuery>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_session_token(request.headers(), &cookies, query).ok_or_else(|| {
        tracing::warn!("❌ No session token presented");
        AppError::Unauthorized
    })?;

    if !is_well_formed(&token) {
        tracing::warn!("❌ Malformed session token");
        return Err(AppError::Unauthorized);
    }

    let user_id = session_service::validate(&state.db, &token)
        .await?
        .ok_or_else(|| {
            tracing::warn!("❌ Session invalid or expired");
            AppError::Unauthorized
        })?;

    tracing::debug!("✅ User authenticated: {}", user_id);

    request.extensions_mut().insert(AuthSession { token, user_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
