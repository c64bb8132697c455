use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use vista_server::config::Config;
use vista_server::services::storage::Artifact;
use vista_server::state::AppState;
use vista_server::create_app;

// None of these requests reach PostgreSQL; the pool never opens a connection.
fn setup(require_tls: bool) -> (Router, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::local(dir.path());
    config.require_tls = require_tls;
    let state = AppState::new(&config).unwrap();
    (create_app(state.clone()), state, dir)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _state, _dir) = setup(false);

    let response = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_method_is_not_found() {
    let (app, _state, _dir) = setup(false);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/video/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/video")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_without_token_is_unauthorized() {
    let (app, _state, _dir) = setup(false);

    let request = Request::builder()
        .method("POST")
        .uri("/video")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_and_edit_require_a_session() {
    let (app, _state, _dir) = setup(false);
    let uri = format!("/video/{}", Uuid::new_v4());

    for method in ["DELETE", "PATCH"] {
        let request = Request::builder()
            .method(method)
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", method);
    }
}

#[tokio::test]
async fn test_malformed_tokens_are_unauthorized() {
    let (app, _state, _dir) = setup(false);

    let request = Request::builder()
        .method("POST")
        .uri("/extras")
        .header(header::AUTHORIZATION, "Bearer short")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/logout?token=not-a-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/video")
        .header(header::COOKIE, "session=%%%")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_bad_password_length() {
    let (app, _state, _dir) = setup(false);

    for password in [String::new(), "x".repeat(73)] {
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username=alice&password={}", password)))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_video_is_streamed() {
    let (app, state, _dir) = setup(false);
    let id = Uuid::new_v4();
    state.storage.write(id, Artifact::Video, b"not really a video").await.unwrap();

    let response = app.oneshot(get(&format!("/video/{}", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        r#"attachment; filename="video""#
    );
    assert_eq!(body_bytes(response).await, b"not really a video");
}

#[tokio::test]
async fn test_thumbnail_is_sniffed_and_cacheable() {
    let (app, state, _dir) = setup(false);
    let id = Uuid::new_v4();
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    state.storage.write(id, Artifact::Thumb, &png).await.unwrap();

    let response = app.oneshot(get(&format!("/thumbnail/{}", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=86400");
}

#[tokio::test]
async fn test_missing_artifacts_are_not_found() {
    let (app, _state, _dir) = setup(false);

    let response = app.clone().oneshot(get(&format!("/meta/{}", Uuid::new_v4()))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/video/..%2F..%2Fetc%2Fpasswd")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_single_extra_download() {
    let (app, state, _dir) = setup(false);
    let id = Uuid::new_v4();
    state.storage.write(id, Artifact::Extra(2), b"extra two").await.unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/extra?videoid={}&index=2", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"extra two");

    let response = app
        .clone()
        .oneshot(get(&format!("/extra?videoid={}&index=1", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get(&format!("/extra?videoid={}&index=-1", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plaintext_rejected_when_tls_required() {
    let (app, state, _dir) = setup(true);
    let id = Uuid::new_v4();
    state.storage.write(id, Artifact::Video, b"v").await.unwrap();

    let response = app.clone().oneshot(get(&format!("/video/{}", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    assert!(response.headers().contains_key(header::UPGRADE));

    let request = Request::builder()
        .uri(format!("/video/{}", id))
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
