// tests/http_adapters.rs
// Outbound adapters against a local axum listener.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use ticker_news_relay::notify::discord::DiscordWebhook;
use ticker_news_relay::notify::DeliverySink;
use ticker_news_relay::report::summarizer::{GeminiSummarizer, Summarizer};
use ticker_news_relay::{Classifier, NewsItem, SourceKind};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(String, Option<String>, Value)>>>);

async fn generate(
    State(seen): State<Captured>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    seen.0.lock().unwrap().push((uri.path().to_string(), key, body));
    Json(json!({
        "candidates": [{"content": {"parts": [{"text": "  나스닥 강세, "}, {"text": "AI 주도 "}]}}]
    }))
}

fn batch() -> Vec<ticker_news_relay::ClassificationResult> {
    let mut it = NewsItem::new("n1", "[속보] 엔비디아 실적 발표", SourceKind::Official, Utc::now());
    it.body = "가이던스 상향".into();
    vec![Classifier::default().classify(&it)]
}

#[tokio::test]
async fn gemini_posts_prompt_and_joins_parts() {
    let seen = Captured::default();
    let base = serve(Router::new().fallback(generate).with_state(seen.clone())).await;
    let summarizer = GeminiSummarizer::new("k-123".into(), "gemini-test", Duration::from_secs(5))
        .unwrap()
        .with_endpoint_base(format!("{base}/v1beta"));

    let text = summarizer.summarize(&batch(), None).await.unwrap();
    assert_eq!(text, "나스닥 강세, AI 주도");

    let calls = seen.0.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (path, key, body) = &calls[0];
    assert_eq!(path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(key.as_deref(), Some("k-123"));
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("[속보] 엔비디아 실적 발표"));
    assert!(body["generationConfig"]["maxOutputTokens"].is_number());
}

#[tokio::test]
async fn gemini_http_error_is_an_error() {
    let base = serve(Router::new().fallback(|| async { StatusCode::SERVICE_UNAVAILABLE })).await;
    let summarizer = GeminiSummarizer::new("k".into(), "m", Duration::from_secs(5))
        .unwrap()
        .with_endpoint_base(base);
    assert!(summarizer.summarize(&batch(), None).await.is_err());
}

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>, Arc<Mutex<Vec<Value>>>);

async fn webhook_down(State(hits): State<Hits>, Json(body): Json<Value>) -> StatusCode {
    hits.0.fetch_add(1, Ordering::SeqCst);
    hits.1.lock().unwrap().push(body);
    StatusCode::INTERNAL_SERVER_ERROR
}

#[tokio::test]
async fn discord_failure_is_reported_after_a_single_post() {
    let hits = Hits::default();
    let base = serve(Router::new().fallback(webhook_down).with_state(hits.clone())).await;
    let sink = DiscordWebhook::new(format!("{base}/api/webhooks/1/x"), "https://saveticker.com");

    let err = sink.deliver(&batch()[0]).await.unwrap_err();
    assert!(err.to_string().contains("HTTP error"));
    assert_eq!(hits.0.load(Ordering::SeqCst), 1);

    let bodies = hits.1.lock().unwrap();
    assert_eq!(bodies[0]["content"], "@everyone ⚡ [속보] 엔비디아 실적 발표");
}

#[tokio::test]
async fn discord_accepts_no_content() {
    let base = serve(Router::new().fallback(|| async { StatusCode::NO_CONTENT })).await;
    let sink = DiscordWebhook::new(base, "https://saveticker.com");
    sink.deliver(&batch()[0]).await.unwrap();
}
