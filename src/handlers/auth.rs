use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Form,
};
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::{AppError, Result},
    handlers::response::empty_object,
    middleware_layer::auth::SESSION_COOKIE,
    models::session::AuthSession,
    services::{auth as auth_service, session as session_service},
    state::AppState,
    validation::auth::{validate_password, CredentialsForm},
};

/// Creates the session cookie mirroring the token returned in the body.
fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_path("/");
    cookie
}

fn token_response(state: &AppState, cookies: &Cookies, token: String) -> Response {
    cookies.add(session_cookie(token.clone(), state.config.require_tls));
    (StatusCode::OK, token).into_response()
}

/// Handles user registration. Responds with the new session token.
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt for: {}", form.username.trim());
    validate_password(&form)?;

    let user_id = auth_service::register(&state.db, &form.username, &form.password).await?;
    let token = session_service::issue(&state.db, user_id).await?;

    tracing::info!("✅ User registered: {}", user_id);
    Ok(token_response(&state, &cookies, token))
}

/// Handles user login. Responds with a fresh session token.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for: {}", form.username.trim());
    validate_password(&form)?;

    let user_id = auth_service::authenticate(&state.db, &form.username, &form.password)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let token = session_service::issue(&state.db, user_id).await?;

    Ok(token_response(&state, &cookies, token))
}

/// Ends the presented session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    cookies: Cookies,
) -> Result<Response> {
    session_service::revoke(&state.db, &session.token).await?;

    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);

    tracing::info!("👋 User {} logged out", session.user_id);
    Ok(empty_object())
}
