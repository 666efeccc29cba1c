//! Frontier model: summaries yielded by the reverse-chronological forum feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Feed timestamps are compared in UTC.
pub type Timestamp = DateTime<Utc>;

/// One summary row of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub id: TaskId,
    pub url: String,
    pub updated_at: Timestamp,
}

impl FrontierEntry {
    pub fn new(id: impl Into<TaskId>, url: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            updated_at,
        }
    }

    /// Entries at or after the watermark are in the crawl window.
    ///
    /// 等しい場合も含める。同一時刻の別タスクを境界で取りこぼさないため。
    pub fn is_at_or_after(&self, watermark: Timestamp) -> bool {
        self.updated_at >= watermark
    }
}

/// One fetched page of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierPage {
    pub entries: Vec<FrontierEntry>,
    /// The source signalled that no further pages exist.
    pub exhausted: bool,
}

impl FrontierPage {
    pub fn new(entries: Vec<FrontierEntry>) -> Self {
        Self {
            entries,
            exhausted: false,
        }
    }

    pub fn last(entries: Vec<FrontierEntry>) -> Self {
        Self {
            entries,
            exhausted: true,
        }
    }
}
