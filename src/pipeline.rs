//! # Poll cycle
//! fetch (both sources, concurrently) → merge → filter → classify → deliver →
//! buffer → commit.
//!
//! Cycles never overlap: the cache store sits behind an async mutex held for
//! the whole cycle, so a tick that fires while the previous cycle is still
//! committing waits instead of interleaving. Shutdown only interrupts the
//! fetch stage; once items have been filtered the cycle runs to its commit.
//! Diagnostics read a copy of the cache counters published after each commit
//! and never wait on that mutex.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use tokio::sync::{watch, Mutex};

use crate::aggregate::AggregationBuffer;
use crate::cache::{CacheStats, CacheStore};
use crate::classify::{ClassificationResult, Classifier, Tier};
use crate::error::{CycleError, FetchError};
use crate::ingest::types::{FetchPage, SourceKind, SourceProvider};
use crate::merge::merge;
use crate::metrics as m;
use crate::notify::DeliverySink;

/// What one cycle did. Returned for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub official_error: Option<FetchError>,
    pub community_error: Option<FetchError>,
    /// False when the merged fingerprint matched the previous cycle.
    pub changed: bool,
    pub fetched: usize,
    pub new_items: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub buffered: usize,
}

pub struct Pipeline {
    official: Arc<dyn SourceProvider>,
    community: Arc<dyn SourceProvider>,
    classifier: Classifier,
    cache: Mutex<CacheStore>,
    stats: RwLock<CacheStats>,
    buffer: Arc<AggregationBuffer>,
    sink: Arc<dyn DeliverySink>,
    page_size: u32,
    deliver_regular: bool,
    pacing: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        official: Arc<dyn SourceProvider>,
        community: Arc<dyn SourceProvider>,
        classifier: Classifier,
        cache: CacheStore,
        buffer: Arc<AggregationBuffer>,
        sink: Arc<dyn DeliverySink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            official,
            community,
            classifier,
            stats: RwLock::new(cache.snapshot()),
            cache: Mutex::new(cache),
            buffer,
            sink,
            page_size: 20,
            deliver_regular: true,
            pacing: Duration::ZERO,
            shutdown,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Regular-tier official items are posted too unless switched off.
    pub fn with_deliver_regular(mut self, on: bool) -> Self {
        self.deliver_regular = on;
        self
    }

    /// Pause between consecutive deliveries within one cycle.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn buffer(&self) -> &Arc<AggregationBuffer> {
        &self.buffer
    }

    /// Cache counters as of the last commit. Does not wait for a running cycle.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let t0 = Instant::now();
        let res = self.cycle(now).await;
        histogram!(m::CYCLE_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);

        let outcome = match &res {
            Ok(r) if r.changed => "changed",
            Ok(_) => "unchanged",
            Err(CycleError::Cancelled) => "cancelled",
            Err(CycleError::AllSourcesFailed { .. }) => "failed",
            Err(CycleError::Persist { .. }) => "persist_failed",
        };
        counter!(m::CYCLES, "outcome" => outcome).increment(1);
        res
    }

    async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let mut cache = self.cache.lock().await;

        let (official, community) = self.fetch_both().await?;
        let mut report = CycleReport {
            official_error: official.as_ref().err().cloned(),
            community_error: community.as_ref().err().cloned(),
            ..CycleReport::default()
        };
        for (kind, err) in [
            (SourceKind::Official, &report.official_error),
            (SourceKind::Community, &report.community_error),
        ] {
            if let Some(e) = err {
                counter!(m::FETCH_ERRORS, "source" => kind.as_str()).increment(1);
                tracing::warn!(target: "ingest", source = %kind, error = %e, kind = e.kind(), "fetch failed");
            }
        }

        let Some(outcome) = merge(official.as_ref().ok(), community.as_ref().ok(), cache.fingerprint()) else {
            return Err(CycleError::AllSourcesFailed {
                official: report.official_error.unwrap_or(FetchError::Timeout),
                community: report.community_error.unwrap_or(FetchError::Timeout),
            });
        };
        report.fetched = outcome.batch.len();

        if !outcome.changed {
            tracing::debug!(target: "ingest", fingerprint = %outcome.batch.fingerprint, items = report.fetched, "feeds unchanged");
            return Ok(report);
        }
        report.changed = true;

        let fresh = cache.filter_new(&outcome.batch);
        report.new_items = fresh.len();
        for kind in [SourceKind::Official, SourceKind::Community] {
            let n = fresh.iter().filter(|it| it.source == kind).count();
            if n > 0 {
                counter!(m::NEW_ITEMS, "source" => kind.as_str()).increment(n as u64);
            }
        }

        let results: Vec<ClassificationResult> =
            fresh.iter().map(|it| self.classifier.classify(it)).collect();

        // merged order is newest first; post oldest first
        let (delivered, failures) = self.deliver(results.iter().rev()).await;
        report.delivered = delivered;
        report.delivery_failures = failures;

        report.buffered = self.buffer.extend(results);
        gauge!(m::BUFFERED).set(self.buffer.len() as f64);

        let committed = cache.commit(&fresh, &outcome.batch, now);
        gauge!(m::SEEN_IDS).set(cache.state().seen.len() as f64);
        *self.stats.write().unwrap_or_else(|e| e.into_inner()) = cache.snapshot();

        tracing::info!(
            target: "ingest",
            fetched = report.fetched,
            new = report.new_items,
            delivered,
            failures,
            buffered = report.buffered,
            fingerprint = %outcome.batch.fingerprint,
            "poll cycle"
        );

        committed.map_err(|source| CycleError::Persist { delivered, source })?;
        Ok(report)
    }

    /// Both fetches run concurrently; the cycle waits for both results.
    /// Shutdown cancels whatever is still in flight.
    async fn fetch_both(
        &self,
    ) -> Result<(Result<FetchPage, FetchError>, Result<FetchPage, FetchError>), CycleError> {
        let mut shutdown = self.shutdown.clone();
        let already = *shutdown.borrow();
        if already {
            return Err(CycleError::Cancelled);
        }
        let stop = async move {
            let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
            if !signalled {
                // sender gone: nobody can ask us to stop any more
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            _ = stop => Err(CycleError::Cancelled),
            pages = async {
                tokio::join!(
                    self.official.fetch_page(self.page_size),
                    self.community.fetch_page(self.page_size),
                )
            } => Ok(pages),
        }
    }

    async fn deliver<'a>(
        &self,
        results: impl Iterator<Item = &'a ClassificationResult>,
    ) -> (usize, usize) {
        let mut delivered = 0;
        let mut failures = 0;
        let mut first = true;
        for r in results {
            if !r.is_deliverable() || (r.tier == Tier::Regular && !self.deliver_regular) {
                continue;
            }
            if !first && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            first = false;

            match self.sink.deliver(r).await {
                Ok(()) => {
                    delivered += 1;
                    counter!(m::DELIVERIES, "outcome" => "ok").increment(1);
                }
                Err(e) => {
                    failures += 1;
                    counter!(m::DELIVERIES, "outcome" => "error").increment(1);
                    tracing::error!(
                        target: "ingest",
                        id = %r.item.id,
                        tier = %r.tier,
                        sink = self.sink.name(),
                        error = %e,
                        "delivery failed, not retried"
                    );
                }
            }
        }
        (delivered, failures)
    }
}
