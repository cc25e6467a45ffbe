// src/ingest/types.rs
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Which of the two upstream feeds an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Editorial news feed. Lower latency, takes precedence on id collisions.
    Official,
    /// User-submitted posts. Only ever summarized, never delivered immediately.
    Community,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Official => "official",
            SourceKind::Community => "community",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A news item after parsing at the fetch boundary. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub likes: u64,
    pub views: u64,
    pub comments: u64,
    pub thumbnail: Option<String>,
    pub author: Option<String>,
    pub source: SourceKind,
    pub created_at: DateTime<Utc>,
}

impl NewsItem {
    /// Minimal item; the remaining fields take their safe defaults.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source: SourceKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            tags: BTreeSet::new(),
            likes: 0,
            views: 0,
            comments: 0,
            thumbnail: None,
            author: None,
            source,
            created_at,
        }
    }

    /// Link to the item's page on the site (`/news/..` vs `/community/..`).
    pub fn detail_url(&self, site_base: &str) -> String {
        let base = site_base.trim_end_matches('/');
        match self.source {
            SourceKind::Official => format!("{base}/news/{}", self.id),
            SourceKind::Community => format!("{base}/community/{}", self.id),
        }
    }
}

/// One page from one source, normalized to oldest-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPage {
    pub source: SourceKind,
    pub items: Vec<NewsItem>,
}

impl FetchPage {
    /// Build a page from upstream order (newest-first), reversing it.
    pub fn from_newest_first(source: SourceKind, mut items: Vec<NewsItem>) -> Self {
        items.reverse();
        Self { source, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the first page. No internal retries; the caller owns retry policy.
    async fn fetch_page(&self, page_size: u32) -> Result<FetchPage, FetchError>;
    fn kind(&self) -> SourceKind;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn detail_url_depends_on_source() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let official = NewsItem::new("42", "t", SourceKind::Official, ts);
        let community = NewsItem::new("7", "t", SourceKind::Community, ts);
        assert_eq!(
            official.detail_url("https://saveticker.com/"),
            "https://saveticker.com/news/42"
        );
        assert_eq!(
            community.detail_url("https://saveticker.com"),
            "https://saveticker.com/community/7"
        );
    }

    #[test]
    fn page_is_reversed_to_oldest_first() {
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap();
        let page = FetchPage::from_newest_first(
            SourceKind::Official,
            vec![
                NewsItem::new("b", "newer", SourceKind::Official, t2),
                NewsItem::new("a", "older", SourceKind::Official, t1),
            ],
        );
        let ids: Vec<_> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
