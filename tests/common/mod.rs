// tests/common/mod.rs
// In-process fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ticker_news_relay::aggregate::AggregationBuffer;
use ticker_news_relay::cache::CacheStore;
use ticker_news_relay::classify::{ClassificationResult, Classifier};
use ticker_news_relay::error::FetchError;
use ticker_news_relay::ingest::types::{FetchPage, NewsItem, SourceKind, SourceProvider};
use ticker_news_relay::notify::{DeliverySink, ReportSink};
use ticker_news_relay::pipeline::Pipeline;
use ticker_news_relay::report::market::{MarketData, MarketSnapshot, SentimentReading};
use ticker_news_relay::report::summarizer::Summarizer;
use ticker_news_relay::report::Report;
use tokio::sync::{watch, Semaphore};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

pub fn item(id: &str, title: &str, source: SourceKind, minute: i64) -> NewsItem {
    NewsItem::new(id, title, source, t0() + chrono::Duration::minutes(minute))
}

/// Provider whose next results are scripted; the last one repeats.
pub struct ScriptedProvider {
    kind: SourceKind,
    script: Mutex<VecDeque<Result<Vec<NewsItem>, FetchError>>>,
    last: Mutex<Result<Vec<NewsItem>, FetchError>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, next: Result<Vec<NewsItem>, FetchError>) -> Self {
        self.script.lock().unwrap().push_back(next);
        self
    }

    pub fn set(&self, next: Result<Vec<NewsItem>, FetchError>) {
        self.script.lock().unwrap().push_back(next);
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    async fn fetch_page(&self, _page_size: u32) -> Result<FetchPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        // scripted lists are in upstream (newest-first) order
        last.clone()
            .map(|items| FetchPage::from_newest_first(self.kind, items))
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}

/// Provider that parks every fetch until the test opens the gate.
pub struct GatedProvider {
    kind: SourceKind,
    items: Vec<NewsItem>,
    gate: Semaphore,
    pub started: AtomicUsize,
}

impl GatedProvider {
    pub fn new(kind: SourceKind, items: Vec<NewsItem>) -> Self {
        Self {
            kind,
            items,
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Let `n` more fetches through.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl SourceProvider for GatedProvider {
    async fn fetch_page(&self, _page_size: u32) -> Result<FetchPage, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|_| FetchError::Timeout)?
            .forget();
        Ok(FetchPage::from_newest_first(self.kind, self.items.clone()))
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}

/// Records every delivered id, in order.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<String>>,
    pub fail_ids: Vec<String>,
}

impl RecordingSink {
    pub fn ids(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, result: &ClassificationResult) -> Result<()> {
        if self.fail_ids.contains(&result.item.id) {
            return Err(anyhow!("sink refused {}", result.item.id));
        }
        self.delivered.lock().unwrap().push(result.item.id.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Default)]
pub struct RecordingReportSink {
    pub reports: Mutex<Vec<Report>>,
}

#[async_trait]
impl ReportSink for RecordingReportSink {
    async fn publish(&self, report: &Report) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Counts calls and records batch ids; fails when `fail` is set.
#[derive(Default)]
pub struct CountingSummarizer {
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub saw_market: Mutex<Vec<bool>>,
    pub fail: bool,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(
        &self,
        batch: &[ClassificationResult],
        market: Option<&MarketSnapshot>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .push(batch.iter().map(|r| r.item.id.clone()).collect());
        self.saw_market.lock().unwrap().push(market.is_some());
        if self.fail {
            return Err(anyhow!("model unavailable"));
        }
        Ok(format!("요약: {}건", batch.len()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub struct FixedMarket(pub Option<MarketSnapshot>);

impl FixedMarket {
    pub fn up() -> Self {
        Self(Some(MarketSnapshot {
            index: None,
            sentiment: Some(SentimentReading {
                value: 61,
                classification: "Greed".into(),
                stale: false,
            }),
            taken_at: t0(),
        }))
    }
}

#[async_trait]
impl MarketData for FixedMarket {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        self.0.clone().ok_or_else(|| anyhow!("market feed down"))
    }
}

pub struct Harness {
    pub official: Arc<ScriptedProvider>,
    pub community: Arc<ScriptedProvider>,
    pub sink: Arc<RecordingSink>,
    pub buffer: Arc<AggregationBuffer>,
    pub pipeline: Pipeline,
    pub shutdown: watch::Sender<bool>,
}

pub fn harness(
    official: ScriptedProvider,
    community: ScriptedProvider,
    sink: RecordingSink,
    cache: CacheStore,
) -> Harness {
    let official = Arc::new(official);
    let community = Arc::new(community);
    let sink = Arc::new(sink);
    let (pipeline, buffer, shutdown) =
        pipeline_with(official.clone(), community.clone(), sink.clone(), cache);
    Harness {
        official,
        community,
        sink,
        buffer,
        pipeline,
        shutdown,
    }
}

/// Pipeline over arbitrary providers with default settings.
pub fn pipeline_with(
    official: Arc<dyn SourceProvider>,
    community: Arc<dyn SourceProvider>,
    sink: Arc<RecordingSink>,
    cache: CacheStore,
) -> (Pipeline, Arc<AggregationBuffer>, watch::Sender<bool>) {
    let buffer = Arc::new(AggregationBuffer::new(t0()));
    let (tx, rx) = watch::channel(false);
    let pipeline = Pipeline::new(
        official,
        community,
        Classifier::default(),
        cache,
        buffer.clone(),
        sink,
        rx,
    );
    (pipeline, buffer, tx)
}
