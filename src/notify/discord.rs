use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{headline, DeliverySink, ReportSink};
use crate::classify::{ClassificationResult, Tier};
use crate::ingest::truncate_chars;
use crate::report::Report;

const COLOR_BREAKING: u32 = 0xff0000;
const COLOR_IMPORTANT: u32 = 0xff9900;
const COLOR_REGULAR: u32 = 0x00bfff;
const COLOR_REPORT: u32 = 0x5865f2;

/// Discord embed field values are capped at 1024 chars.
const FIELD_MAX: usize = 1024;

#[derive(Clone)]
pub struct DiscordWebhook {
    webhook: String,
    site_base: String,
    client: Client,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(webhook: String, site_base: impl Into<String>) -> Self {
        Self {
            webhook,
            site_base: site_base.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// A single attempt: a retried post that did land upstream would show up
    /// twice in the channel.
    async fn post(&self, payload: &WebhookPayload) -> Result<()> {
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| anyhow!("Discord webhook request failed: {e}"))?;
        rsp.error_for_status_ref()
            .map_err(|e| anyhow!("Discord webhook HTTP error: {e}"))?;
        Ok(())
    }

    fn item_payload(&self, result: &ClassificationResult) -> WebhookPayload {
        let it = &result.item;
        let color = match result.tier {
            Tier::Breaking => COLOR_BREAKING,
            Tier::Important => COLOR_IMPORTANT,
            Tier::Regular => COLOR_REGULAR,
        };

        let mut fields = vec![
            EmbedField::inline("👍 좋아요", it.likes.to_string()),
            EmbedField::inline("👁️ 조회수", it.views.to_string()),
        ];
        if !it.tags.is_empty() {
            let tags = it.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" ");
            fields.push(EmbedField::inline("🏷️ 태그", truncate_chars(&tags, FIELD_MAX)));
        }

        WebhookPayload {
            content: Some(headline(result)),
            embeds: vec![Embed {
                title: truncate_chars(&it.title, 256),
                description: truncate_chars(&it.body, 300),
                url: Some(it.detail_url(&self.site_base)),
                color,
                timestamp: Some(it.created_at.to_rfc3339()),
                fields,
                thumbnail: it.thumbnail.clone().map(|url| EmbedImage { url }),
                footer: Some(EmbedFooter {
                    text: format!("{} · {}", result.tier, result.rule),
                }),
            }],
        }
    }

    fn report_payload(report: &Report) -> WebhookPayload {
        let mut fields = Vec::new();
        if let Some(m) = &report.market {
            fields.push(EmbedField::inline("📊 나스닥", m.index_line()));
            if let Some(line) = m.sentiment_line() {
                fields.push(EmbedField::inline("😐 공포탐욕지수", line));
            }
        }
        if !report.headlines.is_empty() {
            fields.push(EmbedField {
                name: "📰 주요 헤드라인".into(),
                value: truncate_chars(&report.headlines, FIELD_MAX),
                inline: false,
            });
        }
        fields.push(EmbedField::inline("분석된 뉴스", format!("{}개", report.item_count)));

        WebhookPayload {
            content: None,
            embeds: vec![Embed {
                title: "📈 시장 동향 리포트".into(),
                description: report.summary.clone(),
                url: None,
                color: COLOR_REPORT,
                timestamp: Some(report.generated_at.to_rfc3339()),
                fields,
                thumbnail: None,
                footer: Some(EmbedFooter {
                    text: report.origin.to_string(),
                }),
            }],
        }
    }
}

#[async_trait::async_trait]
impl DeliverySink for DiscordWebhook {
    async fn deliver(&self, result: &ClassificationResult) -> Result<()> {
        self.post(&self.item_payload(result)).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[async_trait::async_trait]
impl ReportSink for DiscordWebhook {
    async fn publish(&self, report: &Report) -> Result<()> {
        self.post(&Self::report_payload(report)).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}
