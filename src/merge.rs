//! # Merge Engine
//! Combines the two fetched pages into one newest-first, id-unique batch and
//! fingerprints it so an unchanged cycle can be skipped cheaply.
//!
//! Precedence: the official page is read first, so on an id collision its
//! copy of the item wins.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ingest::types::{FetchPage, NewsItem};

/// Hex SHA-256 over the ordered ids plus the fields that change on edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(items: &[NewsItem]) -> Self {
        let mut ids = Sha256::new();
        let mut fields = Sha256::new();
        for it in items {
            ids.update(it.id.as_bytes());
            ids.update([0x1f]);

            fields.update(it.title.as_bytes());
            fields.update([0x1f]);
            fields.update(it.likes.to_le_bytes());
            fields.update(it.views.to_le_bytes());
            fields.update(it.comments.to_le_bytes());
            fields.update(it.created_at.timestamp().to_le_bytes());
            fields.update([0x1e]);
        }
        let mut outer = Sha256::new();
        outer.update(ids.finalize());
        outer.update(fields.finalize());
        Self(format!("{:x}", outer.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough for logs
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBatch {
    /// Newest first.
    pub items: Vec<NewsItem>,
    pub fingerprint: Fingerprint,
}

impl MergedBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub batch: MergedBatch,
    /// False iff the fingerprint equals the previous one.
    pub changed: bool,
}

/// Merge up to two pages. Returns `None` only when both pages are missing; a
/// single failed source still yields a batch from the other one.
pub fn merge(
    official: Option<&FetchPage>,
    community: Option<&FetchPage>,
    previous: Option<&Fingerprint>,
) -> Option<MergeOutcome> {
    if official.is_none() && community.is_none() {
        return None;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut items: Vec<NewsItem> = Vec::new();
    for page in [official, community].into_iter().flatten() {
        for it in &page.items {
            if seen.insert(it.id.as_str()) {
                items.push(it.clone());
            }
        }
    }

    // Newest first; id breaks timestamp ties so the order is total.
    items.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let fingerprint = Fingerprint::of(&items);
    let changed = previous != Some(&fingerprint);
    Some(MergeOutcome {
        batch: MergedBatch { items, fingerprint },
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, min: u32, source: SourceKind) -> NewsItem {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, min, 0).unwrap();
        NewsItem::new(id, format!("title {id}"), source, ts)
    }

    #[test]
    fn timestamp_ties_break_on_id() {
        let a = FetchPage {
            source: SourceKind::Official,
            items: vec![item("x1", 0, SourceKind::Official), item("x3", 0, SourceKind::Official)],
        };
        let b = FetchPage {
            source: SourceKind::Community,
            items: vec![item("x2", 0, SourceKind::Community)],
        };
        let out = merge(Some(&a), Some(&b), None).unwrap();
        let ids: Vec<_> = out.batch.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["x3", "x2", "x1"]);
    }

    #[test]
    fn fingerprint_tracks_engagement_changes() {
        let mut it = item("a", 0, SourceKind::Official);
        let before = Fingerprint::of(std::slice::from_ref(&it));
        it.likes += 1;
        let after = Fingerprint::of(std::slice::from_ref(&it));
        assert_ne!(before, after);
        assert_eq!(before.as_str().len(), 64);
    }

    #[test]
    fn both_missing_is_none_not_unchanged() {
        let prev = Fingerprint::of(&[]);
        assert!(merge(None, None, Some(&prev)).is_none());
    }

    #[test]
    fn one_page_is_enough() {
        let b = FetchPage {
            source: SourceKind::Community,
            items: vec![item("c1", 1, SourceKind::Community)],
        };
        let out = merge(None, Some(&b), None).unwrap();
        assert!(out.changed);
        assert_eq!(out.batch.len(), 1);
    }
}
