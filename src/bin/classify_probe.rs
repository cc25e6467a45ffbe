//! Classify a piece of text with the configured keywords and print the result.
//!
//! Usage: `classify_probe [--likes N] [--views N] [--community] <text...>`

use anyhow::{bail, Context};
use chrono::Utc;
use ticker_news_relay::{Classifier, NewsItem, RelayConfig, SourceKind};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let mut likes = 0u64;
    let mut views = 0u64;
    let mut source = SourceKind::Official;
    let mut words = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--likes" => likes = args.next().context("--likes needs a value")?.parse()?,
            "--views" => views = args.next().context("--views needs a value")?.parse()?,
            "--community" => source = SourceKind::Community,
            _ => words.push(arg),
        }
    }
    if words.is_empty() {
        bail!("usage: classify_probe [--likes N] [--views N] [--community] <text...>");
    }

    let cfg = RelayConfig::load()?;
    let classifier = Classifier::new(cfg.breaking_keywords.iter(), cfg.important_like_threshold);

    let mut item = NewsItem::new("probe", words.join(" "), source, Utc::now());
    item.likes = likes;
    item.views = views;

    let result = classifier.classify(&item);
    println!("tier: {}", result.tier);
    println!("rule: {}", result.rule);
    println!("deliverable: {}", result.is_deliverable());
    println!("{}", serde_json::to_string_pretty(&result.rule)?);
    Ok(())
}
