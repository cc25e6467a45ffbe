//! Report tick: drain the aggregation window, attach market context,
//! summarize (or fall back), publish.

pub mod fallback;
pub mod market;
pub mod summarizer;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;

use crate::aggregate::{select_for_report, AggregationBuffer};
use crate::ingest::truncate_chars;
use crate::notify::ReportSink;
use market::{MarketData, MarketSnapshot};
use summarizer::Summarizer;

/// Upper bound on AI summary text.
pub const SUMMARY_MAX_CHARS: usize = 800;
/// Headlines attached under the summary.
pub const REPORT_HEADLINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrigin {
    /// Summarizer output; carries the provider name.
    Ai(&'static str),
    Fallback,
}

impl ReportOrigin {
    pub fn label(self) -> &'static str {
        match self {
            ReportOrigin::Ai(_) => "ai",
            ReportOrigin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ReportOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportOrigin::Ai(provider) => write!(f, "AI 요약 · {provider}"),
            ReportOrigin::Fallback => f.write_str("기본 요약"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub summary: String,
    pub headlines: String,
    pub item_count: usize,
    pub market: Option<MarketSnapshot>,
    pub origin: ReportOrigin,
    pub window_start: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Nothing buffered, or nothing survived selection. No summarizer call.
    Empty,
    /// A previous drain is still being handed off.
    Busy,
    Published { items: usize, origin: ReportOrigin },
    /// The batch was summarized but the sink refused it; the batch is dropped.
    PublishFailed { items: usize, origin: ReportOrigin, error: String },
}

pub struct Reporter {
    buffer: Arc<AggregationBuffer>,
    market: Arc<dyn MarketData>,
    summarizer: Arc<dyn Summarizer>,
    sink: Arc<dyn ReportSink>,
    max_age: Duration,
    max_items: usize,
}

impl Reporter {
    pub fn new(
        buffer: Arc<AggregationBuffer>,
        market: Arc<dyn MarketData>,
        summarizer: Arc<dyn Summarizer>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            buffer,
            market,
            summarizer,
            sink,
            max_age: Duration::hours(2),
            max_items: 30,
        }
    }

    pub fn with_selection(mut self, max_age: Duration, max_items: usize) -> Self {
        self.max_age = max_age;
        self.max_items = max_items.max(1);
        self
    }

    /// One report tick. The window is always reset, whatever happens downstream;
    /// the buffer stays `Draining` until the hand-off finishes.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> ReportOutcome {
        let Some(drain) = self.buffer.drain(now) else {
            tracing::warn!(target: "report", "previous report still in flight, skipping tick");
            return ReportOutcome::Busy;
        };
        let window_start = drain.window.started_at;
        let drained = drain.window.entries.len();
        let batch = select_for_report(&drain.window.entries, now, self.max_age, self.max_items);

        if batch.is_empty() {
            tracing::info!(target: "report", drained, "nothing to report");
            counter!(crate::metrics::REPORTS, "origin" => "empty").increment(1);
            return ReportOutcome::Empty;
        }

        let market = match self.market.snapshot().await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(target: "report", error = %e, "market snapshot unavailable, reporting without it");
                None
            }
        };

        let (summary, origin) = match self.summarizer.summarize(&batch, market.as_ref()).await {
            Ok(text) => (
                truncate_chars(&text, SUMMARY_MAX_CHARS),
                ReportOrigin::Ai(self.summarizer.name()),
            ),
            Err(e) => {
                tracing::warn!(target: "report", error = %e, summarizer = self.summarizer.name(), "summarizer failed, using fallback");
                (
                    fallback::fallback_summary(&batch, market.as_ref(), now),
                    ReportOrigin::Fallback,
                )
            }
        };

        let report = Report {
            summary,
            headlines: fallback::headline_list(&batch, REPORT_HEADLINES),
            item_count: batch.len(),
            market,
            origin,
            window_start,
            generated_at: now,
        };

        counter!(crate::metrics::REPORTS, "origin" => origin.label()).increment(1);
        let items = report.item_count;
        match self.sink.publish(&report).await {
            Ok(()) => {
                tracing::info!(target: "report", items, drained, %origin, sink = self.sink.name(), "report published");
                ReportOutcome::Published { items, origin }
            }
            Err(e) => {
                tracing::error!(target: "report", error = %e, items, sink = self.sink.name(), "report publish failed, batch dropped");
                ReportOutcome::PublishFailed {
                    items,
                    origin,
                    error: e.to_string(),
                }
            }
        }
    }
}
