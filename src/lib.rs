use axum::{
    Router,
    routing::{delete, get, post},
    middleware::from_fn_with_state,
    extract::DefaultBodyLimit,
};

use tower_cookies::CookieManagerLayer;
use tower_http::trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure};
use tracing::Level;

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod user;
    pub mod session;
    pub mod video;
}

pub mod repositories {
    pub mod user;
    pub mod session;
    pub mod video;
}

pub mod services {
    pub mod auth;
    pub mod session;
    pub mod metadata;
    pub mod storage;
    pub mod videos;
    pub mod query;
}

pub mod handlers {
    pub mod auth;
    pub mod index;
    pub mod response;
    pub mod videos;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod tls;
}

pub mod validation {
    pub mod auth;
    pub mod video;
}

use state::AppState;

/// Builds the application router.
pub fn create_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::index::list_videos))
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/video/{id}", get(handlers::videos::get_video))
        .route("/meta/{id}", get(handlers::videos::get_meta))
        .route("/thumbnail/{id}", get(handlers::videos::get_thumbnail))
        .route("/extras", get(handlers::videos::list_extras))
        .route("/extra", get(handlers::videos::get_extra))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route("/video", post(handlers::videos::upload_video))
        .route(
            "/video/{id}",
            delete(handlers::videos::delete_video).patch(handlers::videos::edit_video),
        )
        .route("/extras", post(handlers::videos::replace_extras))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(handlers::index::not_found)
        .method_not_allowed_fallback(handlers::index::not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(CookieManagerLayer::new())
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::tls::require_tls,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
}
