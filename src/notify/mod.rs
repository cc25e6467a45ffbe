pub mod discord;

use anyhow::Result;

use crate::classify::{ClassificationResult, Tier};
use crate::report::Report;

/// Immediate delivery of one classified item. Failures are reported back and
/// logged by the caller; the item stays seen and is not retried.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, result: &ClassificationResult) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Destination for finished report-cycle briefings.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &Report) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Chat line for a delivered item: mention + marker for high tiers.
pub fn headline(result: &ClassificationResult) -> String {
    let title = if result.item.title.is_empty() {
        "제목 없음"
    } else {
        result.item.title.as_str()
    };
    match result.tier {
        Tier::Breaking => format!("@everyone ⚡ {title}"),
        Tier::Important => format!("@everyone 🔥 {title}"),
        Tier::Regular => format!("📈 {title}"),
    }
}

/// Sink used when no webhook is configured: log lines only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, result: &ClassificationResult) -> Result<()> {
        tracing::info!(
            id = %result.item.id,
            tier = %result.tier,
            rule = %result.rule,
            "{}",
            headline(result)
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[async_trait::async_trait]
impl ReportSink for LogSink {
    async fn publish(&self, report: &Report) -> Result<()> {
        tracing::info!(
            target: "report",
            items = report.item_count,
            origin = %report.origin,
            "{}",
            report.summary
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
