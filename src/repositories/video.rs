use deadpool_postgres::{Pool, Transaction};
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::video::{VideoAsset, VideoFilter, VideoListItem},
};

fn row_to_video(row: &Row) -> Result<VideoAsset> {
    Ok(VideoAsset {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        timestamp: row.try_get("timestamp")?,
        download_size: row.try_get("download_size")?,
        downloads: row.try_get("downloads")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        length: row.try_get("length")?,
    })
}

fn row_to_list_item(row: &Row) -> Result<VideoListItem> {
    Ok(VideoListItem {
        id: row.try_get("id")?,
        userid: row.try_get("owner_id")?,
        username: row.try_get("username")?,
        timestamp: row.try_get("timestamp")?,
        downloadsize: row.try_get("download_size")?,
        downloads: row.try_get("downloads")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        length: row.try_get("length")?,
    })
}

/// Looks up who owns an asset.
///
/// # Returns
///
/// The owner's user ID, or `None` if the asset does not exist.
pub async fn find_owner(pool: &Pool, video_id: Uuid) -> Result<Option<i32>> {
    let client = pool.get().await?;
    let row = client
        .query_opt("SELECT owner_id FROM videos WHERE id = $1", &[&video_id])
        .await?;
    Ok(row.map(|r| r.get("owner_id")))
}

/// Finds an asset by its ID.
pub async fn find_video(pool: &Pool, video_id: Uuid) -> Result<Option<VideoAsset>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, owner_id, timestamp, download_size, downloads, title, description, length
            FROM videos
            WHERE id = $1
            "#,
            &[&video_id],
        )
        .await?;
    row.map(|r| row_to_video(&r)).transpose()
}

/// Works out why an owner-guarded statement matched no row.
async fn missing_or_foreign(tx: &Transaction<'_>, video_id: Uuid) -> Result<AppError> {
    let row = tx
        .query_opt("SELECT owner_id FROM videos WHERE id = $1", &[&video_id])
        .await?;
    Ok(match row {
        Some(_) => AppError::Forbidden(video_id),
        None => AppError::NotFound,
    })
}

/// Inserts an asset, or refreshes its timestamp when the same owner already has it.
///
/// The ownership check and the write are one statement. An existing row owned
/// by someone else is left untouched. `publish` runs while the row is still
/// locked by the open transaction and the transaction commits only if it
/// succeeds, so a concurrent writer of the same ID waits for the outcome.
///
/// # Returns
///
/// * `Some(true)` - the row was inserted.
/// * `Some(false)` - the caller's existing row was refreshed.
/// * `None` - another user owns the asset; `publish` was not called.
pub async fn upsert_owned<F, Fut>(pool: &Pool, video: &VideoAsset, publish: F) -> Result<Option<bool>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_opt(
            r#"
            INSERT INTO videos (id, owner_id, timestamp, download_size, title, description, length)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
                SET timestamp = EXCLUDED.timestamp
                WHERE videos.owner_id = EXCLUDED.owner_id
            RETURNING (xmax = 0) AS inserted
            "#,
            &[
                &video.id,
                &video.owner_id,
                &video.timestamp,
                &video.download_size,
                &video.title,
                &video.description,
                &video.length,
            ],
        )
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let inserted: bool = row.try_get("inserted")?;

    publish().await?;
    tx.commit().await?;
    Ok(Some(inserted))
}

/// Replaces the extra-file index rows of an asset.
///
/// Runs in one transaction holding a row lock on the asset. `publish` is
/// called after the ownership check and before any row changes; if it fails
/// the rows are left as they were.
///
/// # Errors
///
/// * `AppError::NotFound` - the asset does not exist.
/// * `AppError::Forbidden` - the asset belongs to another user.
pub async fn replace_extras<F, Fut>(
    pool: &Pool,
    video_id: Uuid,
    owner_id: i32,
    indices: &[i32],
    publish: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let owner: i32 = tx
        .query_opt("SELECT owner_id FROM videos WHERE id = $1 FOR UPDATE", &[&video_id])
        .await?
        .ok_or(AppError::NotFound)?
        .try_get("owner_id")?;
    if owner != owner_id {
        return Err(AppError::Forbidden(video_id));
    }

    publish().await?;

    tx.execute("DELETE FROM extra_files WHERE video_id = $1", &[&video_id])
        .await?;
    let insert = tx
        .prepare("INSERT INTO extra_files (video_id, idx) VALUES ($1, $2)")
        .await?;
    for idx in indices {
        tx.execute(&insert, &[&video_id, idx]).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Deletes an asset owned by `owner_id`, together with its extra-file rows.
///
/// `remove_files` runs before the commit. If it fails the row survives.
pub async fn delete_owned<F, Fut>(pool: &Pool, video_id: Uuid, owner_id: i32, remove_files: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let deleted = tx
        .query_opt(
            "DELETE FROM videos WHERE id = $1 AND owner_id = $2 RETURNING id",
            &[&video_id, &owner_id],
        )
        .await?;
    if deleted.is_none() {
        return Err(missing_or_foreign(&tx, video_id).await?);
    }

    remove_files().await?;
    tx.commit().await?;
    Ok(())
}

/// Sets the title and description of an asset owned by `owner_id`.
///
/// `rewrite` receives the stored length and runs before the commit.
pub async fn update_details<F, Fut>(
    pool: &Pool,
    video_id: Uuid,
    owner_id: i32,
    title: &str,
    description: &str,
    rewrite: F,
) -> Result<()>
where
    F: FnOnce(i32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_opt(
            r#"
            UPDATE videos
            SET title = $3, description = $4
            WHERE id = $1 AND owner_id = $2
            RETURNING length
            "#,
            &[&video_id, &owner_id, &title, &description],
        )
        .await?;
    let Some(row) = row else {
        return Err(missing_or_foreign(&tx, video_id).await?);
    };

    rewrite(row.try_get("length")?).await?;
    tx.commit().await?;
    Ok(())
}

/// Counts one full download of an asset.
///
/// # Returns
///
/// `false` if the asset has no row.
pub async fn add_download(pool: &Pool, video_id: Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE videos SET downloads = downloads + 1 WHERE id = $1",
            &[&video_id],
        )
        .await?;
    Ok(updated > 0)
}

/// Lists the extra-file indices of an asset in ascending order.
pub async fn list_extras(pool: &Pool, video_id: Uuid) -> Result<Vec<i32>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT idx FROM extra_files WHERE video_id = $1 ORDER BY idx",
            &[&video_id],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get("idx")).collect())
}

/// Lists assets newest first, joined with the owner's username.
pub async fn list_videos(
    pool: &Pool,
    filter: VideoFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<VideoListItem>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT v.id, v.owner_id, u.username, v.timestamp, v.download_size, v.downloads,
                   v.title, v.description, v.length
            FROM videos v
            JOIN users u ON u.id = v.owner_id
            WHERE ($1::INTEGER IS NULL OR v.owner_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR v.timestamp >= $2)
            ORDER BY v.timestamp DESC
            LIMIT $3 OFFSET $4
            "#,
            &[&filter.owner_id, &filter.since, &limit, &offset],
        )
        .await?;
    rows.iter().map(row_to_list_item).collect()
}

/// Counts the assets matching `filter` across all pages.
pub async fn count_videos(pool: &Pool, filter: VideoFilter) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) AS total
            FROM videos v
            WHERE ($1::INTEGER IS NULL OR v.owner_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR v.timestamp >= $2)
            "#,
            &[&filter.owner_id, &filter.since],
        )
        .await?;
    Ok(row.get("total"))
}

