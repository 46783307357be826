use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Unread,
    Finished,
    InProgress,
}

impl ReadStatus {
    /// Maps calibre-web's `book_read_link.read_status` column.
    pub fn from_calibre_web(value: i64) -> Self {
        match value {
            1 => Self::Finished,
            2 => Self::InProgress,
            _ => Self::Unread,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadBook {
    pub book_id: i64,
    pub name: String,
    pub series_id: Option<i64>,
    pub series_index: f64,
    pub tracker_id: Option<i64>,
    pub progress_percent: f64,
    pub read_status: ReadStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesVolume {
    pub book_id: i64,
    pub name: String,
    pub series_index: f64,
    pub tracker_id: Option<i64>,
    pub chapters: Option<u32>,
}

impl SeriesVolume {
    pub fn chapter_count(&self) -> u32 {
        self.chapters.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaListStatus {
    Current,
    Planning,
    Completed,
    Dropped,
    Paused,
    Repeating,
}

impl MediaListStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Planning => "PLANNING",
            Self::Completed => "COMPLETED",
            Self::Dropped => "DROPPED",
            Self::Paused => "PAUSED",
            Self::Repeating => "REPEATING",
        }
    }
}

impl fmt::Display for MediaListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote list state for one media item. Maximums of 0 mean the service does
/// not know the total yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEntry {
    pub media_id: i64,
    pub progress_volumes: u32,
    pub progress_chapters: u32,
    pub max_volumes: u32,
    pub max_chapters: u32,
    pub status: Option<MediaListStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationDecision {
    pub current_volume: u32,
    pub current_chapter: u32,
    pub target_volume: u32,
    pub target_chapter: u32,
    pub status: MediaListStatus,
    pub update_volume: bool,
    pub update_chapter: bool,
}

impl ReconciliationDecision {
    pub fn has_updates(&self) -> bool {
        self.update_volume || self.update_chapter
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: Vec<String>,
    pub would_update: Vec<String>,
    pub processed: usize,
    pub skipped: usize,
}

impl SyncReport {
    pub fn summary_line(&self, dry_run: bool) -> String {
        let titles = if dry_run {
            &self.would_update
        } else {
            &self.updated
        };
        if titles.is_empty() {
            return "No updates required".to_owned();
        }
        let prefix = if dry_run {
            "Dry run: would update"
        } else {
            "Updated"
        };
        format!("{prefix} {} title(s): {}", titles.len(), titles.join(", "))
    }
}

/// Attached as context to the error of an aborted run; carries the titles
/// whose remote writes already went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSync {
    pub updated: Vec<String>,
}

impl fmt::Display for PartialSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.updated.is_empty() {
            return f.write_str("sync aborted before any update was applied");
        }
        write!(
            f,
            "sync aborted after updating {} title(s): {}",
            self.updated.len(),
            self.updated.join(", ")
        )
    }
}
