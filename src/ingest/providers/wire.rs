// src/ingest/providers/wire.rs
//! Upstream payload shapes. Everything loosely typed stops here: fields that are
//! missing or of the wrong type fall back to empty/zero instead of failing the page.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::types::{FetchPage, NewsItem, SourceKind};
use crate::ingest::{normalize_text, BODY_MAX_CHARS, TITLE_MAX_CHARS};

#[derive(Debug, Deserialize)]
struct OfficialEnvelope {
    news_list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CommunityEnvelope {
    posts: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireItem {
    #[serde(deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    content: Option<String>,
    #[serde(deserialize_with = "lenient_tags")]
    tag_names: Vec<String>,
    #[serde(deserialize_with = "lenient_tags")]
    community_tags: Vec<String>,
    #[serde(deserialize_with = "lenient_like_stats")]
    like_stats: Option<LikeStats>,
    #[serde(deserialize_with = "lenient_count")]
    view_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    comment_count: u64,
    #[serde(deserialize_with = "lenient_string")]
    thumbnail: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    author_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LikeStats {
    #[serde(deserialize_with = "lenient_count")]
    like_count: u64,
}

/// Parse a raw response body into an oldest-first page.
pub fn parse_page(source: SourceKind, body: &str) -> Result<FetchPage, FetchError> {
    let raw_items = match source {
        SourceKind::Official => {
            serde_json::from_str::<OfficialEnvelope>(body)
                .map_err(|e| FetchError::Malformed(format!("official payload: {e}")))?
                .news_list
        }
        SourceKind::Community => {
            serde_json::from_str::<CommunityEnvelope>(body)
                .map_err(|e| FetchError::Malformed(format!("community payload: {e}")))?
                .posts
        }
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        let wire = match WireItem::deserialize(raw) {
            Ok(w) => w,
            Err(e) => {
                tracing::debug!(target: "ingest", %source, error = %e, "skipping non-object item");
                continue;
            }
        };
        if let Some(item) = wire.into_item(source) {
            items.push(item);
        }
    }

    Ok(FetchPage::from_newest_first(source, items))
}

impl WireItem {
    fn into_item(self, source: SourceKind) -> Option<NewsItem> {
        let id = self.id.filter(|s| !s.trim().is_empty())?;

        let tags: BTreeSet<String> = self
            .tag_names
            .into_iter()
            .chain(self.community_tags)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Some(NewsItem {
            id: id.trim().to_string(),
            title: normalize_text(self.title.as_deref().unwrap_or_default(), TITLE_MAX_CHARS),
            body: normalize_text(self.content.as_deref().unwrap_or_default(), BODY_MAX_CHARS),
            tags,
            likes: self.like_stats.map(|l| l.like_count).unwrap_or(0),
            views: self.view_count,
            comments: self.comment_count,
            thumbnail: self.thumbnail.filter(|t| !t.trim().is_empty()),
            author: self.author_name.filter(|a| !a.trim().is_empty()),
            source,
            created_at: self
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_like_stats<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LikeStats>, D::Error> {
    Ok(match Value::deserialize(d)? {
        v @ Value::Object(_) => LikeStats::deserialize(v).ok(),
        _ => None,
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Tags arrive either as plain strings or as `{ "name": .. }` objects.
fn lenient_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let Value::Array(values) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Object(mut o) => match o.remove("name") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        })
        .collect())
}
