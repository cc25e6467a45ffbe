// tests/diagnostics_router.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, item, pipeline_with, t0, GatedProvider, RecordingSink, ScriptedProvider};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;
use ticker_news_relay::cache::CacheStore;
use ticker_news_relay::metrics::{router, Diagnostics};
use ticker_news_relay::SourceKind::{Community, Official};

async fn app_after_one_cycle(dir: &std::path::Path) -> Router {
    let official = ScriptedProvider::new(Official).then(Ok(vec![
        item("n2", "two", Official, 2),
        item("n1", "one", Official, 1),
    ]));
    let h = harness(official, ScriptedProvider::new(Community), RecordingSink::default(), CacheStore::open(dir));
    h.pipeline.run_cycle(t0()).await.unwrap();

    // local recorder handle; nothing is installed globally
    let handle = PrometheusBuilder::new().build_recorder().handle();
    router(Diagnostics {
        handle,
        pipeline: Arc::new(h.pipeline),
        buffer: h.buffer.clone(),
    })
}

async fn get(app: &Router, path: &str) -> (StatusCode, String) {
    let resp = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_after_one_cycle(dir.path()).await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stats_reports_cache_and_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_after_one_cycle(dir.path()).await;

    let (status, body) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["cache"]["unique_ids"], 2);
    assert_eq!(v["cache"]["total_processed"], 2);
    assert_eq!(v["cache"]["last_response_count"], 2);
    assert_eq!(v["buffered"], 2);
    assert_eq!(v["draining"], false);
}

#[tokio::test]
async fn there_are_no_write_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_after_one_cycle(dir.path()).await;

    let resp = app
        .clone()
        .oneshot(Request::post("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = get(&app, "/reset").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_does_not_wait_for_a_running_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let official = Arc::new(GatedProvider::new(Official, vec![item("n1", "one", Official, 1)]));
    let (pipeline, buffer, _shutdown) = pipeline_with(
        official.clone(),
        Arc::new(ScriptedProvider::new(Community)),
        Arc::new(RecordingSink::default()),
        CacheStore::open(dir.path()),
    );
    let pipeline = Arc::new(pipeline);

    official.open(1);
    pipeline.run_cycle(t0()).await.unwrap();

    // second cycle holds the cache lock while parked in its fetch
    let running = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_cycle(t0()).await }
    });
    official.wait_started(2).await;

    let app = router(Diagnostics {
        handle: PrometheusBuilder::new().build_recorder().handle(),
        pipeline,
        buffer,
    });
    let (status, body) = tokio::time::timeout(Duration::from_secs(2), get(&app, "/stats"))
        .await
        .expect("/stats blocked behind the poll cycle");
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["cache"]["unique_ids"], 1);

    official.open(1);
    assert!(!running.await.unwrap().unwrap().changed);
}
