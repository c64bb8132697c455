use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A stored video asset row.
#[derive(Debug, Clone)]
pub struct VideoAsset {
    pub id: Uuid,
    pub owner_id: i32,
    pub timestamp: DateTime<Utc>,
    pub download_size: i64,
    /// Completed full downloads of the video blob.
    pub downloads: i64,
    pub title: String,
    pub description: String,
    pub length: i32,
}

/// A row of the public listing, joined with the owner's username.
#[derive(Debug, Clone, Serialize)]
pub struct VideoListItem {
    pub id: Uuid,
    pub userid: i32,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub downloadsize: i64,
    pub downloads: i64,
    pub title: String,
    pub description: String,
    pub length: i32,
}

/// One page of the public listing.
#[derive(Debug, Clone, Serialize)]
pub struct VideoPage {
    /// Number of assets matching the filters across all pages.
    pub totalcount: i64,
    /// 1-based page number, `offset / count + 1`.
    pub page: i64,
    /// The effective page size.
    pub count: i64,
    /// Rows actually returned on this page.
    pub returned: usize,
    pub videos: Vec<VideoListItem>,
}

/// Whether an ingestion created the asset or refreshed the caller's existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Refreshed,
}

/// Filters applied to the public listing. `None` means unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoFilter {
    /// Only assets owned by this user.
    pub owner_id: Option<i32>,
    /// Only assets modified at or after this instant.
    pub since: Option<DateTime<Utc>>,
}
