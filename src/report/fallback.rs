//! Deterministic, non-AI report text. Used whenever the summarizer is
//! unavailable or fails, so a report tick always produces something.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::market::MarketSnapshot;
use crate::classify::ClassificationResult;
use crate::ingest::truncate_chars;
use crate::ingest::types::NewsItem;

/// Discord embed description budget for the fallback text.
pub const FALLBACK_MAX_CHARS: usize = 1024;

/// Well-known tickers, highest priority first.
pub const FAMOUS_TICKERS: &[&str] = &[
    // mega-cap tech
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "META", "NFLX", "TSLA", "NVDA",
    // semis
    "AMD", "INTC", "QCOM", "AVGO", "TXN", "AMAT", "LRCX", "KLAC", "MU", "MRVL",
    // financials
    "JPM", "BAC", "WFC", "GS", "MS", "C", "BLK", "AXP", "V", "MA",
    // healthcare
    "JNJ", "PFE", "UNH", "ABBV", "MRK", "TMO", "ABT", "DHR", "BMY", "AMGN",
    // energy
    "XOM", "CVX", "COP", "EOG", "SLB", "MPC", "VLO", "PSX", "KMI",
    // other large caps
    "BRK.B", "BRK.A", "PG", "KO", "WMT", "HD", "VZ", "T", "DIS", "NKE", "MCD", "BA", "CAT",
    "IBM", "GE", "F", "GM", "UBER", "LYFT", "SPOT", "SQ", "PYPL",
    // crypto-adjacent
    "COIN", "MSTR", "RIOT", "MARA", "HUT", "BITF",
    // AI / cloud
    "SNOW", "CRWD", "ZS", "OKTA", "DDOG", "NET", "PLTR",
];

/// First famous ticker mentioned as a standalone token, with its priority.
pub fn famous_ticker(item: &NewsItem) -> Option<(usize, &'static str)> {
    let text = format!("{} {}", item.title, item.body).to_uppercase();
    FAMOUS_TICKERS
        .iter()
        .enumerate()
        .find(|(_, t)| contains_token(&text, t))
        .map(|(i, t)| (i, *t))
}

/// `needle` occurs with no ASCII letter/digit directly on either side, so "C"
/// does not match inside "CPI" but "TSLA" matches in "TSLA가".
fn contains_token(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        let free = |c: Option<char>| c.map_or(true, |c| !c.is_ascii_alphanumeric());
        free(before) && free(after)
    })
}

fn popularity(item: &NewsItem) -> f64 {
    item.likes as f64 + item.views as f64 * 0.1
}

/// Items with a famous ticker first (by ticker priority), then by popularity.
pub fn sort_by_ticker_priority(items: &[ClassificationResult]) -> Vec<&ClassificationResult> {
    let mut out: Vec<&ClassificationResult> = items.iter().collect();
    out.sort_by(|a, b| {
        match (famous_ticker(&a.item), famous_ticker(&b.item)) {
            (Some((pa, _)), Some((pb, _))) => pa.cmp(&pb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| {
            popularity(&b.item)
                .partial_cmp(&popularity(&a.item))
                .unwrap_or(Ordering::Equal)
        })
    });
    out
}

/// Most frequent tags, ties broken alphabetically.
pub fn popular_tags(items: &[ClassificationResult], top_n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in items {
        for t in &r.item.tags {
            *counts.entry(t.as_str()).or_default() += 1;
        }
    }
    let mut v: Vec<(String, usize)> = counts.into_iter().map(|(t, n)| (t.to_string(), n)).collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(top_n);
    v
}

/// Numbered headline list with author and ticker annotations.
pub fn headline_list(items: &[ClassificationResult], max_items: usize) -> String {
    sort_by_ticker_priority(items)
        .into_iter()
        .take(max_items)
        .enumerate()
        .map(|(i, r)| {
            let title = if r.item.title.is_empty() { "제목 없음" } else { &r.item.title };
            let author = r.item.author.as_deref().unwrap_or("Unknown");
            let ticker = famous_ticker(&r.item)
                .map(|(_, t)| format!(" [{t}]"))
                .unwrap_or_default();
            format!("{}. {title} (by {author}){ticker}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn fallback_summary(
    items: &[ClassificationResult],
    market: Option<&MarketSnapshot>,
    now: DateTime<Utc>,
) -> String {
    let mut s = format!("📊 **{} 시장 동향 요약** (기본 요약)\n\n", now.format("%Y-%m-%d %H:%M"));

    if let Some(m) = market {
        if m.index.is_some() {
            s.push_str(&format!("**📊 나스닥**: {}\n", m.index_line()));
        }
        if let Some(line) = m.sentiment_line() {
            s.push_str(&format!("**공포탐욕지수**: {line}\n"));
        }
        s.push('\n');
    }

    s.push_str("🔥 **인기 뉴스 (트렌드 분석):**\n");
    for (i, r) in sort_by_ticker_priority(items).into_iter().take(5).enumerate() {
        let it = &r.item;
        s.push_str(&format!(
            "{}. {} (by {}) 👍{} 👁️{}\n",
            i + 1,
            if it.title.is_empty() { "제목 없음" } else { &it.title },
            it.author.as_deref().unwrap_or("Unknown"),
            it.likes,
            it.views
        ));
    }

    let tags = popular_tags(items, 5);
    if !tags.is_empty() {
        s.push_str("\n🏷️ **인기 키워드/태그:**\n");
        for (tag, n) in tags {
            s.push_str(&format!("• {tag} ({n}회 언급)\n"));
        }
    }

    s.push_str("\n📰 **전체 뉴스 헤드라인 (유명한 주식 우선):**\n");
    s.push_str(&headline_list(items, 10));
    s.push_str(&format!("\n\n📈 **분석된 뉴스 수**: {}개\n", items.len()));
    s.push_str("⚠️ **참고**: AI 분석이 일시적으로 불가능하여 기본 요약을 제공합니다.\n");

    truncate_chars(&s, FALLBACK_MAX_CHARS)
}
