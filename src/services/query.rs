use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::Pool;
use serde::Deserialize;

use crate::error::Result;
use crate::models::video::{VideoFilter, VideoPage};
use crate::repositories::video as video_repo;
use crate::services::auth;
use crate::validation::auth::normalize_username;

/// Page size used when the requested one is missing or out of range.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// The largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw listing parameters. Values stay strings so that garbage falls back to
/// defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub offset: Option<String>,
    pub count: Option<String>,
    pub author: Option<String>,
    pub agedays: Option<String>,
}

/// Normalized listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub count: i64,
    pub author: Option<String>,
    pub agedays: Option<i64>,
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

impl PageRequest {
    pub fn from_query(query: &ListQuery) -> Self {
        let count = parse_int(query.count.as_deref())
            .filter(|c| (1..=MAX_PAGE_SIZE).contains(c))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = parse_int(query.offset.as_deref())
            .filter(|o| *o >= 0)
            .unwrap_or(0);
        let agedays = parse_int(query.agedays.as_deref()).filter(|d| *d >= 0);
        let author = query.author.as_deref().and_then(normalize_username);

        Self {
            offset,
            count,
            author,
            agedays,
        }
    }

    /// 1-based page number.
    pub fn page(&self) -> i64 {
        self.offset / self.count + 1
    }

    /// The oldest timestamp included, if the age filter is set.
    ///
    /// An age reaching before the representable range includes everything.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = Duration::try_days(self.agedays?)?;
        now.checked_sub_signed(days)
    }

    fn empty_page(&self) -> VideoPage {
        VideoPage {
            totalcount: 0,
            page: self.page(),
            count: self.count,
            returned: 0,
            videos: Vec::new(),
        }
    }
}

/// Lists assets newest first.
///
/// An author that does not resolve to a user matches nothing.
pub async fn list(db: &Pool, request: &PageRequest, now: DateTime<Utc>) -> Result<VideoPage> {
    let owner_id = match &request.author {
        Some(author) => match auth::find_user_id(db, author).await? {
            Some(id) => Some(id),
            None => {
                tracing::debug!("Listing for unknown author {}", author);
                return Ok(request.empty_page());
            }
        },
        None => None,
    };

    let filter = VideoFilter {
        owner_id,
        since: request.since(now),
    };

    let totalcount = video_repo::count_videos(db, filter).await?;
    let videos = video_repo::list_videos(db, filter, request.count, request.offset).await?;

    Ok(VideoPage {
        totalcount,
        page: request.page(),
        count: request.count,
        returned: videos.len(),
        videos,
    })
}
