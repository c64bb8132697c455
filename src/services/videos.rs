use chrono::Utc;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::video::{IngestOutcome, VideoAsset};
use crate::repositories::video as video_repo;
use crate::services::metadata::{self, VideoMetadata};
use crate::services::storage::{Artifact, Staging};
use crate::state::AppState;

/// A metadata document is a few short lines; anything past this is ignored.
const MAX_META_BYTES: u64 = 64 * 1024;

/// Fails with `Forbidden` if the asset exists and belongs to someone else.
async fn ensure_not_foreign(db: &Pool, user_id: i32, video_id: Uuid) -> Result<()> {
    match video_repo::find_owner(db, video_id).await? {
        Some(owner) if owner != user_id => Err(AppError::Forbidden(video_id)),
        _ => Ok(()),
    }
}

/// Stores an uploaded asset and records it under the caller's ownership.
///
/// The payloads arrive staged outside the asset directory. They are moved
/// into place only after the row has been claimed for the caller, inside the
/// same transaction, so a rejected upload never touches the owner's files.
/// A later upload of the same asset by its owner refreshes only the timestamp.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The authenticated caller.
/// * `video_id` - The asset ID chosen by the uploader.
/// * `upload` - The staged `video` and optional `thumb` and `meta`.
///
/// # Returns
///
/// Whether the asset was created or refreshed.
pub async fn ingest(
    state: &AppState,
    user_id: i32,
    video_id: Uuid,
    upload: Staging,
) -> Result<IngestOutcome> {
    tracing::info!("📤 Ingesting video {} for user {}", video_id, user_id);

    if upload.size_of(Artifact::Video).is_none() {
        return Err(AppError::Validation("Missing video".to_string()));
    }
    if upload.artifacts().any(|artifact| matches!(artifact, Artifact::Extra(_))) {
        return Err(AppError::Validation("Extra files are uploaded separately".to_string()));
    }

    // Rejects the common case without taking a row lock.
    ensure_not_foreign(&state.db, user_id, video_id).await?;

    let meta = upload
        .read_head(Artifact::Meta, MAX_META_BYTES)
        .await?
        .map(|raw| metadata::best_effort(&raw))
        .unwrap_or_default();

    let written = upload.total_bytes();
    let asset = VideoAsset {
        id: video_id,
        owner_id: user_id,
        timestamp: Utc::now(),
        download_size: i64::try_from(written).unwrap_or(i64::MAX),
        downloads: 0,
        title: meta.title,
        description: meta.description,
        length: meta.length,
    };

    let storage = &state.storage;
    let outcome =
        video_repo::upsert_owned(&state.db, &asset, || storage.publish(video_id, &upload)).await?;

    match outcome {
        Some(true) => {
            tracing::info!("✅ Video {} created ({} bytes)", video_id, written);
            Ok(IngestOutcome::Created)
        }
        Some(false) => {
            tracing::info!("✅ Video {} refreshed", video_id);
            Ok(IngestOutcome::Refreshed)
        }
        None => Err(AppError::Forbidden(video_id)),
    }
}

/// Replaces the full set of extra files of an asset.
///
/// Every staged file is moved into place before the index rows change. Files
/// left over from the previous set are removed afterwards.
///
/// # Arguments
///
/// * `upload` - Staged `extra{N}` files. Indices must be non-negative; staging
///   already refuses the same index twice.
///
/// # Returns
///
/// The indices of the new set, ascending.
pub async fn replace_extras(
    state: &AppState,
    user_id: i32,
    video_id: Uuid,
    upload: Staging,
) -> Result<Vec<i32>> {
    let mut indices = Vec::new();
    for artifact in upload.artifacts() {
        match artifact {
            Artifact::Extra(index) if index >= 0 => indices.push(index),
            Artifact::Extra(_) => {
                return Err(AppError::Validation("Negative extra index".to_string()));
            }
            other => {
                return Err(AppError::Validation(format!(
                    "Unexpected {} field",
                    other.file_name()
                )));
            }
        }
    }
    indices.sort_unstable();

    let storage = &state.storage;
    video_repo::replace_extras(&state.db, video_id, user_id, &indices, || {
        storage.publish(video_id, &upload)
    })
    .await?;

    match storage.remove_extras_except(video_id, &indices).await {
        Ok(0) => {}
        Ok(removed) => tracing::debug!("🧹 Removed {} stale extras of {}", removed, video_id),
        Err(e) => tracing::warn!("Could not clean stale extras of {}: {}", video_id, e),
    }

    tracing::info!("✅ Video {} now has {} extras", video_id, indices.len());
    Ok(indices)
}

/// Deletes an asset the caller owns: its row, its extra-file rows and its
/// directory.
pub async fn delete(state: &AppState, user_id: i32, video_id: Uuid) -> Result<()> {
    let storage = &state.storage;
    video_repo::delete_owned(&state.db, video_id, user_id, || async move {
        if !storage.remove_asset(video_id).await? {
            tracing::warn!("Video {} had no files on disk", video_id);
        }
        Ok::<_, AppError>(())
    })
    .await?;

    tracing::info!("🗑️ Video {} deleted by user {}", video_id, user_id);
    Ok(())
}

/// Changes the title and description of an asset the caller owns.
///
/// The stored metadata document is rewritten to match.
pub async fn edit_details(
    state: &AppState,
    user_id: i32,
    video_id: Uuid,
    title: &str,
    description: &str,
) -> Result<()> {
    let flatten = |value: &str| value.trim().replace(['\r', '\n'], " ");
    let title = flatten(title);
    let description = flatten(description);

    let storage = &state.storage;
    video_repo::update_details(&state.db, video_id, user_id, &title, &description, |length| {
        let document = metadata::encode(&VideoMetadata {
            version: metadata::CURRENT_VERSION,
            guid: Some(video_id),
            title: title.clone(),
            description: description.clone(),
            length,
        });
        async move {
            storage.write(video_id, Artifact::Meta, document.as_bytes()).await?;
            Ok::<_, AppError>(())
        }
    })
    .await?;

    tracing::info!("✏️ Video {} details updated", video_id);
    Ok(())
}

/// Counts one full download of an asset.
pub async fn record_download(db: &Pool, video_id: Uuid) -> Result<bool> {
    video_repo::add_download(db, video_id).await
}

/// Lists the extra-file indices of an asset.
pub async fn list_extras(db: &Pool, video_id: Uuid) -> Result<Vec<i32>> {
    video_repo::list_extras(db, video_id).await
}
