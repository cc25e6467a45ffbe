//! Summarizer abstraction for report ticks + the Gemini provider.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::market::MarketSnapshot;
use crate::classify::ClassificationResult;
use crate::ingest::truncate_chars;

/// Body excerpt length per item inside the prompt.
const PROMPT_BODY_CHARS: usize = 500;
const PROMPT_MAX_ITEMS: usize = 50;

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize one report batch. Errors make the caller fall back to the
    /// deterministic summary.
    async fn summarize(
        &self,
        batch: &[ClassificationResult],
        market: Option<&MarketSnapshot>,
    ) -> Result<String>;

    /// Provider name for logs and the report footer.
    fn name(&self) -> &'static str;
}

/// No API key configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSummarizer;

#[async_trait::async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _: &[ClassificationResult], _: Option<&MarketSnapshot>) -> Result<String> {
        Err(anyhow!("summarizer disabled"))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

pub struct GeminiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint_base: String,
}

impl GeminiSummarizer {
    pub fn new(api_key: String, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ticker-news-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building gemini http client")?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
            endpoint_base: "https://generativelanguage.googleapis.com/v1beta".into(),
        })
    }

    /// Point at a different API host (local stubs).
    pub fn with_endpoint_base(mut self, base: impl Into<String>) -> Self {
        self.endpoint_base = base.into();
        self
    }
}

#[async_trait::async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(
        &self,
        batch: &[ClassificationResult],
        market: Option<&MarketSnapshot>,
    ) -> Result<String> {
        if batch.is_empty() {
            bail!("empty batch");
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenConfig {
            temperature: f32,
            max_output_tokens: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenConfig,
        }

        let prompt = build_prompt(batch, market, Utc::now());
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenConfig {
                temperature: 0.4,
                max_output_tokens: 1024,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.endpoint_base, self.model);
        let rsp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .context("gemini request")?;
        let status = rsp.status();
        if !status.is_success() {
            bail!("gemini HTTP {status}");
        }
        let body: GenerateResponse = rsp.json().await.context("gemini response body")?;
        extract_text(body).ok_or_else(|| anyhow!("gemini returned no text"))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}
#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}
#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn extract_text(rsp: GenerateResponse) -> Option<String> {
    let text: String = rsp
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// One block per item: title, author, engagement, time, tags, excerpt.
pub fn format_items(batch: &[ClassificationResult]) -> String {
    batch
        .iter()
        .take(PROMPT_MAX_ITEMS)
        .enumerate()
        .map(|(i, r)| {
            let it = &r.item;
            let tags = if it.tags.is_empty() {
                "태그: 없음".to_string()
            } else {
                format!("태그: {}", it.tags.iter().cloned().collect::<Vec<_>>().join(", "))
            };
            let body = if it.body.is_empty() {
                "내용 없음".to_string()
            } else {
                truncate_chars(&it.body, PROMPT_BODY_CHARS)
            };
            format!(
                "뉴스 {}:\n제목: {}\n작성자: {} (좋아요: {}, 조회수: {})\n시간: {}\n{tags}\n내용: {body}\n",
                i + 1,
                if it.title.is_empty() { "제목 없음" } else { &it.title },
                it.author.as_deref().unwrap_or("Unknown"),
                it.likes,
                it.views,
                it.created_at.to_rfc3339(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_market(market: &MarketSnapshot) -> String {
    let mut s = String::new();
    if let Some(q) = &market.index {
        s.push_str(&format!(
            "나스닥: 현재가 {:.2} USD, 변동 {:+.2} ({:+.2}%), 시장상태 {}\n",
            q.price, q.change, q.change_pct, q.market_state
        ));
    }
    if let Some(f) = &market.sentiment {
        s.push_str(&format!("공포탐욕지수: {} ({})\n", f.value, f.classification));
    }
    s
}

pub fn build_prompt(
    batch: &[ClassificationResult],
    market: Option<&MarketSnapshot>,
    now: DateTime<Utc>,
) -> String {
    let market_text = market.map(format_market).unwrap_or_else(|| "없음\n".into());
    format!(
        "{} 기준 주식/경제 뉴스와 시장 데이터를 분석하여 Discord 임베드에 들어갈 간결한 요약을 작성하세요.\n\n\
         제약: 전체 800자 이내, 한국어, 이모지 최소화, 유사한 뉴스는 통합.\n\n\
         형식:\n시장 현황: [나스닥 방향성 + 공포탐욕지수 해석]\n\n주요 이슈:\n- [이슈 1]\n- [이슈 2]\n- [이슈 3]\n\n\
         핵심 키워드: [키워드 3-5개]\n\n\
         시장 데이터:\n{market_text}\n뉴스 데이터:\n{}",
        now.format("%Y-%m-%d %H:%M"),
        format_items(batch)
    )
}
