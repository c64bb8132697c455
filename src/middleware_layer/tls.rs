use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

/// TLS is terminated by the proxy in front of us; this header tells us what
/// the client actually spoke.
const FORWARDED_PROTO: &str = "x-forwarded-proto";

fn is_secure(headers: &HeaderMap) -> bool {
    headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Rejects plaintext requests with 426 when the deployment requires TLS.
pub async fn require_tls(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if state.config.require_tls && !is_secure(request.headers()) {
        return Err(AppError::UpgradeRequired);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_secure() {
        let mut headers = HeaderMap::new();
        assert!(!is_secure(&headers));

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("HTTPS"));
        assert!(is_secure(&headers));

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("http, https"));
        assert!(!is_secure(&headers));
    }
}
