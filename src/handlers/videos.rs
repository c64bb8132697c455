use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Form,
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::io::{ErrorKind, SeekFrom};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::response::{empty_object, json},
    models::session::AuthSession,
    services::{
        storage::{Artifact, Staging},
        videos as video_service,
    },
    state::AppState,
    validation::video::{validate_details, DetailsForm},
};

/// How much of a blob is read to guess its content type.
const SNIFF_BYTES: usize = 8192;

/// Thumbnails rarely change; let clients keep them for a day.
const THUMBNAIL_CACHE_CONTROL: &str = "max-age=86400";

/// The `/extras` query.
#[derive(Debug, Deserialize)]
pub struct ExtrasQuery {
    pub videoid: Option<String>,
}

/// The `/extra` query.
#[derive(Debug, Deserialize)]
pub struct ExtraQuery {
    pub videoid: Option<String>,
    pub index: Option<String>,
}

fn parse_video_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation("Invalid video id".to_string()))
}

/// Streams one artifact with a sniffed content type.
async fn serve_artifact(state: &AppState, id: Uuid, artifact: Artifact) -> Result<Response> {
    let (mut file, len) = state.storage.open(id, artifact).await?;

    let mut head = vec![0u8; SNIFF_BYTES.min(len as usize)];
    file.read_exact(&mut head).await?;
    file.seek(SeekFrom::Start(0)).await?;

    let content_type = match infer::get(&head) {
        Some(kind) => kind.mime_type(),
        None if artifact == Artifact::Meta => "text/plain; charset=utf-8",
        None => "application/octet-stream",
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    let disposition = format!(r#"attachment; filename="{}""#, artifact.file_name());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if artifact == Artifact::Thumb {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL));
    }

    tracing::debug!("📥 Serving {} of {} ({} bytes)", artifact.file_name(), id, len);
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

/// Ids in the path that are not UUIDs cannot exist.
fn path_video_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

async fn serve_by_path(state: &AppState, raw_id: &str, artifact: Artifact) -> Result<Response> {
    serve_artifact(state, path_video_id(raw_id)?, artifact).await
}

/// Streams the video blob and counts the download in the background.
pub async fn get_video(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id = path_video_id(&id)?;
    let response = serve_artifact(&state, id, Artifact::Video).await?;

    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = video_service::record_download(&db, id).await {
            tracing::warn!("Could not count download of {}: {}", id, e);
        }
    });

    Ok(response)
}

pub async fn get_meta(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    serve_by_path(&state, &id, Artifact::Meta).await
}

pub async fn get_thumbnail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    serve_by_path(&state, &id, Artifact::Thumb).await
}

/// Serves a single extra file.
pub async fn get_extra(State(state): State<AppState>, Query(query): Query<ExtraQuery>) -> Result<Response> {
    let id = parse_video_id(query.videoid.as_deref().unwrap_or_default())?;
    let index: i32 = query
        .index
        .as_deref()
        .and_then(|i| i.trim().parse().ok())
        .filter(|i| *i >= 0)
        .ok_or_else(|| AppError::Validation("Invalid extra index".to_string()))?;
    serve_artifact(&state, id, Artifact::Extra(index)).await
}

/// Lists the extra-file indices of an asset as a JSON array.
pub async fn list_extras(State(state): State<AppState>, Query(query): Query<ExtrasQuery>) -> Result<Response> {
    let id = parse_video_id(query.videoid.as_deref().unwrap_or_default())?;
    let indices = video_service::list_extras(&state.db, id).await?;
    json(&indices)
}

/// Streams one multipart field into the staging area.
async fn stage_field(staging: &mut Staging, artifact: Artifact, field: Field<'_>) -> Result<u64> {
    let mut reader = StreamReader::new(
        field.map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e.body_text())),
    );
    match staging.write_stream(artifact, &mut reader).await {
        // The request body broke off or was malformed; the disk is fine.
        Err(AppError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
            Err(AppError::Multipart(e.to_string()))
        }
        other => other,
    }
}

/// Handles a video upload: multipart fields `uuid`, `video`, `thumb` and `meta`.
///
/// Files are streamed to disk as they arrive.
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut video_id: Option<Uuid> = None;
    let mut staging = state.storage.stage().await?;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();
        let artifact = match field_name.as_str() {
            "uuid" => {
                video_id = Some(parse_video_id(&field.text().await?)?);
                continue;
            }
            "video" => Artifact::Video,
            "thumb" => Artifact::Thumb,
            "meta" => Artifact::Meta,
            _ => continue,
        };
        stage_field(&mut staging, artifact, field).await?;
    }

    let video_id = video_id.ok_or(AppError::Validation("Missing uuid".into()))?;
    let outcome = video_service::ingest(&state, session.user_id, video_id, staging).await?;
    tracing::debug!("Upload of {} finished: {:?}", video_id, outcome);

    Ok(empty_object())
}

/// Maps an `/extras` form field to the index it uploads.
///
/// `extra` takes the next free position and `extra{N}` names the index. Any
/// other name starting with `extra` is rejected; unrelated fields are ignored.
fn extra_index(name: &str, position: usize) -> Result<Option<i32>> {
    if name == "extra" {
        return i32::try_from(position)
            .map(Some)
            .map_err(|_| AppError::Validation("Too many extra files".to_string()));
    }
    if !name.starts_with("extra") {
        return Ok(None);
    }
    match Artifact::from_file_name(name) {
        Some(Artifact::Extra(index)) => Ok(Some(index)),
        _ => Err(AppError::Validation(format!("Invalid extra field: {}", name))),
    }
}

/// Replaces the extra files of an asset.
///
/// Multipart `uuid` plus one field per file. A field named `extra` takes its
/// position among the files as index; `extra{N}` sets the index explicitly.
pub async fn replace_extras(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut video_id: Option<Uuid> = None;
    let mut staging = state.storage.stage().await?;
    let mut staged = 0;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == "uuid" {
            video_id = Some(parse_video_id(&field.text().await?)?);
            continue;
        }
        let Some(index) = extra_index(&field_name, staged)? else {
            continue;
        };
        stage_field(&mut staging, Artifact::Extra(index), field).await?;
        staged += 1;
    }

    let video_id = video_id.ok_or(AppError::Validation("Missing uuid".into()))?;
    video_service::replace_extras(&state, session.user_id, video_id, staging).await?;

    Ok(empty_object())
}

/// Deletes an asset owned by the caller.
pub async fn delete_video(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<Response> {
    video_service::delete(&state, session.user_id, path_video_id(&id)?).await?;
    Ok(empty_object())
}

/// Edits the title and description of an asset owned by the caller.
pub async fn edit_video(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Form(form): Form<DetailsForm>,
) -> Result<Response> {
    let id = path_video_id(&id)?;
    validate_details(&form)?;
    video_service::edit_details(&state, session.user_id, id, &form.title, &form.description)
        .await?;
    Ok(empty_object())
}
