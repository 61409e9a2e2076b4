// Core data structures for the novel catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External site a novel originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceSite {
    BiQuGe = 1,
    QiDian = 2,
}

impl SourceSite {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::BiQuGe),
            2 => Some(Self::QiDian),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BiQuGe => "biquge",
            Self::QiDian => "qidian",
        }
    }
}

/// Publication status of a discovered source catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    NotPublished = 1,
    Published = 2,
}

impl SourceStatus {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::NotPublished),
            2 => Some(Self::Published),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

/// Status of a published novel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NovelStatus {
    Writing = 1,
    Done = 2,
    Banned = 3,
}

impl NovelStatus {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Writing),
            2 => Some(Self::Done),
            3 => Some(Self::Banned),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

/// A discovered-but-not-yet-published novel, staged from scraping.
///
/// (source, source_id) and (name, author, source) are unique; rows are
/// never deleted, only flipped to Published once a Novel is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovelSource {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub source: SourceSite,
    pub source_id: i64,
    pub status: SourceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A published novel visible to readers
///
/// name/author/source are immutable once set; the counters and
/// updated_weight are recomputed by background jobs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Novel {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub source: SourceSite,
    pub status: NovelStatus,
    pub chapter_count: i64,
    pub word_count: i64,
    pub views: i64,
    pub downloads: i64,
    pub favorites: i64,
    pub updated_weight: i64,
    pub cover: String,
    pub summary: String,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chapter of a novel; content stays empty until first read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub novel_id: i64,
    pub no: i64,
    pub title: String,
    pub content: String,
    pub word_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scraped novel metadata, before any storage row exists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NovelDetail {
    pub name: String,
    pub author: String,
    pub summary: String,
    pub category: String,
    pub source_id: i64,
    pub cover_url: String,
}

impl NovelDetail {
    /// A zero source id means the scrape did not resolve to a novel
    pub fn is_empty(&self) -> bool {
        self.source_id == 0
    }
}

/// A chapter header discovered from a source's chapter list.
///
/// `no` is the 0-based position in the list; ordering comes from page
/// position, not from any source-side numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterStub {
    pub title: String,
    pub no: i64,
    pub url: String,
}

/// Lookup parameters identifying a novel across catalogs
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub name: String,
    pub author: String,
    pub source: Option<SourceSite>,
}

impl QueryParams {
    pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            source: None,
        }
    }
}

/// One entry of the derived category summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_site_roundtrip() {
        assert_eq!(SourceSite::from_i64(1), Some(SourceSite::BiQuGe));
        assert_eq!(SourceSite::from_i64(2), Some(SourceSite::QiDian));
        assert_eq!(SourceSite::from_i64(9), None);
        assert_eq!(SourceSite::BiQuGe.as_i64(), 1);
        assert_eq!(SourceSite::QiDian.as_str(), "qidian");
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(SourceStatus::from_i64(1), Some(SourceStatus::NotPublished));
        assert_eq!(SourceStatus::Published.as_i64(), 2);
        assert_eq!(NovelStatus::from_i64(3), Some(NovelStatus::Banned));
        assert_eq!(NovelStatus::from_i64(0), None);
    }

    #[test]
    fn test_detail_is_empty() {
        assert!(NovelDetail::default().is_empty());
        let detail = NovelDetail {
            source_id: 42,
            ..Default::default()
        };
        assert!(!detail.is_empty());
    }
}
