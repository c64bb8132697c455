use axum::{
    extract::{Query, State},
    response::Response,
};
use chrono::Utc;

use crate::{
    error::{AppError, Result},
    handlers::response::json,
    services::query::{self, ListQuery, PageRequest},
    state::AppState,
};

/// Lists public assets, newest first.
pub async fn list_videos(State(state): State<AppState>, Query(params): Query<ListQuery>) -> Result<Response> {
    let request = PageRequest::from_query(&params);
    let page = query::list(&state.db, &request, Utc::now()).await?;
    tracing::debug!("📋 Listing page {} ({} of {})", page.page, page.returned, page.totalcount);
    json(&page)
}

/// Unknown routes and unsupported methods.
pub async fn not_found() -> AppError {
    AppError::NotFound
}
