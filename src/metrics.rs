//! Prometheus export + the read-only diagnostics router.

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::aggregate::{AggregationBuffer, BufferState};
use crate::cache::CacheStats;
use crate::pipeline::Pipeline;

pub const FETCH_ERRORS: &str = "relay_fetch_errors_total";
pub const FETCH_MS: &str = "relay_fetch_ms";
pub const CYCLES: &str = "relay_cycles_total";
pub const CYCLE_MS: &str = "relay_cycle_ms";
pub const NEW_ITEMS: &str = "relay_new_items_total";
pub const DELIVERIES: &str = "relay_deliveries_total";
pub const REPORTS: &str = "relay_reports_total";
pub const SEEN_IDS: &str = "relay_seen_ids";
pub const BUFFERED: &str = "relay_buffered_items";
pub const LAST_POLL_TS: &str = "relay_last_poll_ts";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(FETCH_ERRORS, "Source fetch failures by source.");
        describe_histogram!(FETCH_MS, "Source fetch + parse time in milliseconds.");
        describe_counter!(CYCLES, "Poll cycles by outcome (changed/unchanged/failed/cancelled).");
        describe_histogram!(CYCLE_MS, "Poll cycle wall time in milliseconds.");
        describe_counter!(NEW_ITEMS, "Never-seen items by source.");
        describe_counter!(DELIVERIES, "Immediate deliveries by outcome.");
        describe_counter!(REPORTS, "Report ticks by origin (ai/fallback/empty).");
        describe_gauge!(SEEN_IDS, "Ids currently in the persisted seen-set.");
        describe_gauge!(BUFFERED, "Items waiting in the aggregation window.");
        describe_gauge!(LAST_POLL_TS, "Unix ts when the poll loop last finished a cycle.");
    });
}

/// Install the global Prometheus recorder.
pub fn install() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

#[derive(Clone)]
pub struct Diagnostics {
    pub handle: PrometheusHandle,
    pub pipeline: Arc<Pipeline>,
    pub buffer: Arc<AggregationBuffer>,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub cache: CacheStats,
    pub buffered: usize,
    pub draining: bool,
}

/// `/metrics`, `/health`, `/stats`. Nothing here mutates relay state.
pub fn router(diag: Diagnostics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "OK" }))
        .route("/stats", get(stats))
        .with_state(diag)
}

async fn render_metrics(State(diag): State<Diagnostics>) -> String {
    diag.handle.render()
}

async fn stats(State(diag): State<Diagnostics>) -> Json<StatsView> {
    Json(StatsView {
        cache: diag.pipeline.stats(),
        buffered: diag.buffer.len(),
        draining: diag.buffer.state() == BufferState::Draining,
    })
}
