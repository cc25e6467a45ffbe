// src/ingest/providers/mod.rs
pub mod wire;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;

use crate::error::FetchError;
use crate::ingest::types::{FetchPage, SourceKind, SourceProvider};

/// Feed provider for either upstream list endpoint.
pub struct FeedProvider {
    kind: SourceKind,
    mode: Mode,
}

enum Mode {
    // Stored copy of a captured response body (tests, dry runs).
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl FeedProvider {
    pub fn from_fixture(kind: SourceKind, body: &str) -> Self {
        Self {
            kind,
            mode: Mode::Fixture(body.to_string()),
        }
    }

    /// `timeout` bounds the whole request including the body read.
    pub fn from_url(kind: SourceKind, url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ticker-news-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(4)))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            kind,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    fn query(&self, page_size: u32) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("page", "1".to_string()),
            ("page_size", page_size.to_string()),
            ("sort", "created_at_desc".to_string()),
        ];
        if self.kind == SourceKind::Community {
            q.push(("category", "user_news".to_string()));
            q.push(("search", String::new()));
        }
        q
    }

    async fn get_body(url: &str, client: &reqwest::Client, query: &[(&str, String)]) -> Result<String, FetchError> {
        let resp = client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_page(&self, page_size: u32) -> Result<FetchPage, FetchError> {
        let t0 = Instant::now();
        let page = match &self.mode {
            Mode::Fixture(body) => wire::parse_page(self.kind, body),
            Mode::Http { url, client } => {
                let body = Self::get_body(url, client, &self.query(page_size)).await?;
                wire::parse_page(self.kind, &body)
            }
        }?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!(crate::metrics::FETCH_MS, "source" => self.kind.as_str()).record(ms);
        tracing::debug!(target: "ingest", source = %self.kind, items = page.len(), ms, "page fetched");
        Ok(page)
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}
