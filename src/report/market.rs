//! Market context for report ticks: NASDAQ Composite quote + Fear & Greed index.
//! Read-only; a failure here only removes market lines from the report.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const NASDAQ_PRIMARY: &str = "https://query1.finance.yahoo.com/v8/finance/chart/%5EIXIC";
const NASDAQ_FALLBACK: &str = "https://query2.finance.yahoo.com/v8/finance/chart/%5EIXIC";
const FEAR_GREED: &str = "https://api.alternative.me/fng/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub market_state: String,
    /// Served from the last good copy because the refresh failed.
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// 0 (extreme fear) ..= 100 (extreme greed)
    pub value: u8,
    pub classification: String,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub index: Option<IndexQuote>,
    pub sentiment: Option<SentimentReading>,
    pub taken_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn index_line(&self) -> String {
        match &self.index {
            Some(q) => {
                let arrow = if q.change >= 0.0 { "📈" } else { "📉" };
                let stale = if q.stale { " (캐시 데이터)" } else { "" };
                format!("{arrow} {:.2} ({:+.2}%){stale}", q.price, q.change_pct)
            }
            None => "N/A".to_string(),
        }
    }

    pub fn sentiment_line(&self) -> Option<String> {
        self.sentiment.as_ref().map(|s| {
            let stale = if s.stale { " (캐시 데이터)" } else { "" };
            format!("{} {} ({}){stale}", sentiment_emoji(s.value), s.value, s.classification)
        })
    }
}

pub fn sentiment_emoji(value: u8) -> &'static str {
    match value {
        75..=u8::MAX => "😍",
        55..=74 => "😊",
        45..=54 => "😐",
        25..=44 => "😰",
        _ => "😱",
    }
}

#[async_trait::async_trait]
pub trait MarketData: Send + Sync {
    async fn snapshot(&self) -> Result<MarketSnapshot>;
}

/// Used when market context is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMarketData;

#[async_trait::async_trait]
impl MarketData for NoMarketData {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        Err(anyhow!("market data disabled"))
    }
}

/// Yahoo chart + alternative.me, with backoff on 429/5xx and a last-good copy.
pub struct HttpMarketData {
    client: reqwest::Client,
    max_attempts: u32,
    backoff_base: Duration,
    last_index: Mutex<Option<IndexQuote>>,
    last_sentiment: Mutex<Option<SentimentReading>>,
}

impl HttpMarketData {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Mozilla/5.0 (compatible; ticker-news-relay/", env!("CARGO_PKG_VERSION"), ")"))
            .timeout(timeout)
            .build()
            .context("building market http client")?;
        Ok(Self {
            client,
            max_attempts: 3,
            backoff_base: Duration::from_millis(700),
            last_index: Mutex::new(None),
            last_sentiment: Mutex::new(None),
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let mut last_err = anyhow!("no attempt made");
        for attempt in 0..self.max_attempts {
            match self.client.get(url).send().await {
                Ok(rsp) if rsp.status().is_success() => {
                    return rsp.json().await.context("market json body");
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    last_err = anyhow!("HTTP {status} from {url}");
                    // only throttling and server errors are worth another try
                    if !(status.as_u16() == 429 || status.is_server_error()) {
                        break;
                    }
                }
                Err(e) => last_err = anyhow!("request to {url} failed: {e}"),
            }
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
            }
        }
        Err(last_err)
    }

    async fn fetch_index(&self) -> Result<IndexQuote> {
        let v = match self.get_json(NASDAQ_PRIMARY).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(target: "report", error = %e, "primary quote host failed, trying fallback");
                self.get_json(NASDAQ_FALLBACK).await?
            }
        };
        parse_chart(&v)
    }

    async fn fetch_sentiment(&self) -> Result<SentimentReading> {
        parse_fear_greed(&self.get_json(FEAR_GREED).await?)
    }
}

#[async_trait::async_trait]
impl MarketData for HttpMarketData {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        let (index, sentiment) = tokio::join!(self.fetch_index(), self.fetch_sentiment());

        let index = refresh_or_stale(&self.last_index, index, "nasdaq", |q| q.stale = true);
        let sentiment = refresh_or_stale(&self.last_sentiment, sentiment, "fear_greed", |s| {
            s.stale = true
        });

        if index.is_none() && sentiment.is_none() {
            return Err(anyhow!("no market data available"));
        }
        Ok(MarketSnapshot {
            index,
            sentiment,
            taken_at: Utc::now(),
        })
    }
}

/// Keep a fresh value, or fall back to the last good one marked stale.
fn refresh_or_stale<T: Clone>(
    slot: &Mutex<Option<T>>,
    fresh: Result<T>,
    what: &str,
    mark_stale: impl FnOnce(&mut T),
) -> Option<T> {
    let mut last = slot.lock().unwrap_or_else(|e| e.into_inner());
    match fresh {
        Ok(v) => {
            *last = Some(v.clone());
            Some(v)
        }
        Err(e) => {
            tracing::warn!(target: "report", error = %e, what, stale_available = last.is_some(), "market refresh failed");
            last.clone().map(|mut v| {
                mark_stale(&mut v);
                v
            })
        }
    }
}

#[derive(Deserialize)]
struct Chart {
    chart: ChartBody,
}
#[derive(Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Vec<ChartResult>,
}
#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: f64,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    market_state: Option<String>,
}

pub fn parse_chart(v: &serde_json::Value) -> Result<IndexQuote> {
    let chart: Chart = serde_json::from_value(v.clone()).context("chart payload")?;
    let meta = chart
        .chart
        .result
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("chart payload has no result"))?
        .meta;
    let prev = meta
        .previous_close
        .or(meta.chart_previous_close)
        .unwrap_or(0.0);
    let change = meta.regular_market_price - prev;
    let change_pct = if prev != 0.0 { change / prev * 100.0 } else { 0.0 };
    Ok(IndexQuote {
        price: round2(meta.regular_market_price),
        change: round2(change),
        change_pct: round2(change_pct),
        market_state: meta.market_state.unwrap_or_else(|| "CLOSED".into()),
        stale: false,
    })
}

pub fn parse_fear_greed(v: &serde_json::Value) -> Result<SentimentReading> {
    let first = v
        .get("data")
        .and_then(|d| d.get(0))
        .ok_or_else(|| anyhow!("fear & greed payload has no data"))?;
    let value = match first.get("value") {
        Some(serde_json::Value::String(s)) => s.trim().parse::<u8>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    }
    .ok_or_else(|| anyhow!("fear & greed value missing"))?;
    let classification = first
        .get("value_classification")
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown")
        .to_string();
    Ok(SentimentReading {
        value: value.min(100),
        classification,
        stale: false,
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
