//! # Aggregation Buffer
//! Collects classified items between report ticks. The poll cycle writes, the
//! report task drains. A drain swaps the whole window out under the lock, so
//! writes that arrive while a drained batch is being summarized land in the
//! next window instead of being lost or interleaved.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::classify::ClassificationResult;

/// Upper bound on buffered entries; the oldest are dropped beyond it.
pub const DEFAULT_WINDOW_CAP: usize = 1_000;

/// Per-term ceiling for engagement counts in the report score.
const ENGAGEMENT_CAP: u64 = i64::MAX as u64 / 8;

/// Title terms that make an item more report-worthy.
const MARKET_KEYWORDS: [&str; 30] = [
    "속보", "긴급", "중요", "특보", "급등", "급락", "폭등", "폭락", "ai", "반도체", "테슬라",
    "애플", "구글", "마이크로소프트", "아마존", "nvidia", "amd", "인텔", "삼성", "sk하이닉스",
    "lg", "현대차", "fed", "연준", "금리", "인플레이션", "gdp", "고용지표", "cpi", "fomc",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationWindow {
    pub started_at: DateTime<Utc>,
    pub entries: Vec<ClassificationResult>,
}

impl AggregationWindow {
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Collecting,
    Draining,
}

#[derive(Debug)]
pub struct AggregationBuffer {
    window: Mutex<AggregationWindow>,
    draining: AtomicBool,
    cap: usize,
}

/// Held by the report task while it hands a drained window off. Dropping it
/// returns the buffer to `Collecting`, whether the hand-off succeeded or not.
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a AggregationBuffer,
    pub window: AggregationWindow,
    pub ended_at: DateTime<Utc>,
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        self.buffer.draining.store(false, Ordering::Release);
    }
}

impl AggregationBuffer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_cap(now, DEFAULT_WINDOW_CAP)
    }

    pub fn with_cap(now: DateTime<Utc>, cap: usize) -> Self {
        Self {
            window: Mutex::new(AggregationWindow::empty(now)),
            draining: AtomicBool::new(false),
            cap: cap.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregationWindow> {
        // The window holds plain data; a panic elsewhere cannot leave it half-updated.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> BufferState {
        if self.draining.load(Ordering::Acquire) {
            BufferState::Draining
        } else {
            BufferState::Collecting
        }
    }

    /// Append this cycle's results. Ids already in the window are skipped.
    pub fn extend(&self, results: impl IntoIterator<Item = ClassificationResult>) -> usize {
        let mut w = self.lock();
        let mut ids: HashSet<String> = w.entries.iter().map(|r| r.item.id.clone()).collect();
        let before = w.entries.len();
        for r in results {
            if ids.insert(r.item.id.clone()) {
                w.entries.push(r);
            }
        }
        if w.entries.len() > self.cap {
            let excess = w.entries.len() - self.cap;
            w.entries.drain(0..excess);
            tracing::warn!(target: "report", dropped = excess, cap = self.cap, "aggregation window full, dropped oldest");
        }
        w.entries.len().saturating_sub(before)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap the current window for an empty one starting at `now`.
    /// Returns `None` while a previous drain is still being handed off.
    pub fn drain(&self, now: DateTime<Utc>) -> Option<Drain<'_>> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let window = std::mem::replace(&mut *self.lock(), AggregationWindow::empty(now));
        Some(Drain {
            buffer: self,
            window,
            ended_at: now,
        })
    }
}

/// Pick what goes into a report: recent, title-unique, highest score first.
pub fn select_for_report(
    entries: &[ClassificationResult],
    now: DateTime<Utc>,
    max_age: Duration,
    max_items: usize,
) -> Vec<ClassificationResult> {
    let cutoff = now - max_age;
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_bodies: HashSet<String> = HashSet::new();
    let mut picked: Vec<(i64, ClassificationResult)> = Vec::new();

    // newest first so duplicates keep their most recent copy
    let mut ordered: Vec<&ClassificationResult> = entries.iter().collect();
    ordered.sort_by(|a, b| b.item.created_at.cmp(&a.item.created_at));

    for r in ordered {
        let ts = r.item.created_at;
        // Epoch means the upstream sent no usable timestamp; don't age those out.
        if ts != DateTime::<Utc>::UNIX_EPOCH && ts < cutoff {
            continue;
        }
        let title = normalize_title(&r.item.title);
        if title.is_empty() || !seen_titles.insert(title) {
            continue;
        }
        let head: String = r.item.body.chars().take(100).collect();
        if !head.is_empty() && !seen_bodies.insert(head) {
            continue;
        }
        picked.push((importance_score(r, now), r.clone()));
    }

    picked.sort_by(|a, b| b.0.cmp(&a.0));
    picked.into_iter().take(max_items).map(|(_, r)| r).collect()
}

/// likes x3, views/10 (max 50), comments x2, +10 per market keyword, +20 if < 30 min old.
pub fn importance_score(r: &ClassificationResult, now: DateTime<Utc>) -> i64 {
    let it = &r.item;
    // upstream counts are unbounded; clamp every term so the sum cannot wrap
    let likes = it.likes.min(ENGAGEMENT_CAP) as i64 * 3;
    let views = (it.views / 10).min(50) as i64;
    let comments = it.comments.min(ENGAGEMENT_CAP) as i64 * 2;

    let title = it.title.to_lowercase();
    let keywords = 10 * MARKET_KEYWORDS.iter().filter(|k| title.contains(*k)).count() as i64;

    let age = now.signed_duration_since(it.created_at);
    let recency = if age >= Duration::zero() && age < Duration::minutes(30) { 20 } else { 0 };

    likes
        .saturating_add(views)
        .saturating_add(comments)
        .saturating_add(keywords)
        .saturating_add(recency)
}

fn normalize_title(title: &str) -> String {
    static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
    let re = RE_PUNCT.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"));
    let stripped = re.replace_all(&title.to_lowercase(), "").to_string();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
