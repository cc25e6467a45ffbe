//! Ticker News Relay — Binary Entrypoint
//! Loads config, wires sources, sinks and collaborators, then runs the poll
//! and report loops until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticker_news_relay::aggregate::AggregationBuffer;
use ticker_news_relay::cache::CacheStore;
use ticker_news_relay::classify::Classifier;
use ticker_news_relay::ingest::providers::FeedProvider;
use ticker_news_relay::ingest::types::SourceKind;
use ticker_news_relay::metrics::{self as relay_metrics, Diagnostics};
use ticker_news_relay::notify::discord::DiscordWebhook;
use ticker_news_relay::notify::{DeliverySink, LogSink, ReportSink};
use ticker_news_relay::pipeline::Pipeline;
use ticker_news_relay::report::market::HttpMarketData;
use ticker_news_relay::report::summarizer::{DisabledSummarizer, GeminiSummarizer, Summarizer};
use ticker_news_relay::report::Reporter;
use ticker_news_relay::scheduler::{spawn_poll_loop, spawn_report_loop};
use ticker_news_relay::RelayConfig;

/// `RUST_LOG` controls the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticker_news_relay=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load().context("loading relay config")?;
    tracing::info!(
        poll_secs = cfg.poll_interval_secs,
        report_secs = cfg.report_interval_secs,
        cache_dir = %cfg.cache_dir.display(),
        webhook = cfg.discord_webhook_url.is_some(),
        ai = cfg.gemini_api_key.is_some(),
        "starting ticker-news-relay"
    );

    let prometheus = relay_metrics::install()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- Sources ---
    let official = Arc::new(FeedProvider::from_url(
        SourceKind::Official,
        cfg.official_url.clone(),
        cfg.fetch_timeout(),
    )?);
    let community = Arc::new(FeedProvider::from_url(
        SourceKind::Community,
        cfg.community_url.clone(),
        cfg.fetch_timeout(),
    )?);

    // --- Sinks ---
    let delivery: Arc<dyn DeliverySink> = match &cfg.discord_webhook_url {
        Some(url) => Arc::new(
            DiscordWebhook::new(url.clone(), cfg.site_base_url.clone())
                .with_timeout(cfg.fetch_timeout_secs),
        ),
        None => {
            tracing::warn!("DISCORD_WEBHOOK_URL not set, deliveries go to the log");
            Arc::new(LogSink)
        }
    };
    let report_sink: Arc<dyn ReportSink> = match cfg.effective_report_webhook() {
        Some(url) => Arc::new(
            DiscordWebhook::new(url.to_string(), cfg.site_base_url.clone())
                .with_timeout(cfg.fetch_timeout_secs),
        ),
        None => Arc::new(LogSink),
    };

    // --- Collaborators ---
    let summarizer: Arc<dyn Summarizer> = match &cfg.gemini_api_key {
        Some(key) => Arc::new(GeminiSummarizer::new(
            key.clone(),
            cfg.gemini_model.clone(),
            cfg.fetch_timeout() * 3,
        )?),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, reports use the fallback summary");
            Arc::new(DisabledSummarizer)
        }
    };
    let market = Arc::new(HttpMarketData::new(cfg.fetch_timeout())?);

    // --- Core ---
    let buffer = Arc::new(AggregationBuffer::new(Utc::now()));
    let pipeline = Arc::new(
        Pipeline::new(
            official,
            community,
            Classifier::new(cfg.breaking_keywords.iter(), cfg.important_like_threshold),
            CacheStore::open(&cfg.cache_dir),
            buffer.clone(),
            delivery,
            shutdown_rx.clone(),
        )
        .with_page_size(cfg.page_size)
        .with_deliver_regular(cfg.deliver_regular)
        .with_pacing(cfg.delivery_pacing()),
    );
    let reporter = Arc::new(
        Reporter::new(buffer.clone(), market, summarizer, report_sink)
            .with_selection(cfg.report_max_age(), cfg.report_max_items),
    );

    let poll = spawn_poll_loop(pipeline.clone(), cfg.poll_interval(), shutdown_rx.clone());
    let report = spawn_report_loop(reporter, cfg.report_interval(), shutdown_rx.clone());

    if let Some(addr) = cfg.metrics_addr {
        let app = relay_metrics::router(Diagnostics {
            handle: prometheus,
            pipeline: pipeline.clone(),
            buffer: buffer.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding diagnostics listener on {addr}"))?;
        tracing::info!(%addr, "diagnostics listening");
        let mut stop = shutdown_rx.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|s| *s).await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "diagnostics listener failed");
            }
        });
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let (p, r) = tokio::join!(poll, report);
    if let Err(e) = p {
        tracing::error!(error = %e, "poll task ended abnormally");
    }
    if let Err(e) = r {
        tracing::error!(error = %e, "report task ended abnormally");
    }
    tracing::info!("bye");
    Ok(())
}
