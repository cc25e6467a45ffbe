// src/config.rs
//! `RelayConfig`: TOML file first, environment on top, then validation.

use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::classify::DEFAULT_BREAKING_KEYWORDS;
use crate::error::ConfigError;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub official_url: String,
    pub community_url: String,
    pub page_size: u32,
    pub breaking_keywords: Vec<String>,
    pub important_like_threshold: u64,
    pub poll_interval_secs: u64,
    pub report_interval_secs: u64,
    pub report_max_items: usize,
    pub report_max_age_secs: u64,
    pub fetch_timeout_secs: u64,
    pub cache_dir: PathBuf,
    pub site_base_url: String,
    pub discord_webhook_url: Option<String>,
    /// Falls back to `discord_webhook_url`.
    pub report_webhook_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub deliver_regular: bool,
    pub delivery_pacing_ms: u64,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            official_url: "https://api.saveticker.com/api/news/list".into(),
            community_url: "https://api.saveticker.com/api/community/list".into(),
            page_size: 20,
            breaking_keywords: DEFAULT_BREAKING_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            important_like_threshold: 5,
            poll_interval_secs: 10,
            report_interval_secs: 3600,
            report_max_items: 30,
            report_max_age_secs: 7200,
            fetch_timeout_secs: 10,
            cache_dir: PathBuf::from("cache"),
            site_base_url: "https://saveticker.com".into(),
            discord_webhook_url: None,
            report_webhook_url: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".into(),
            deliver_regular: true,
            delivery_pacing_ms: 1000,
            metrics_addr: None,
        }
    }
}

impl RelayConfig {
    /// Load using `$RELAY_CONFIG_PATH` (or `config/relay.toml`), then env.
    /// A missing default file means built-in defaults; a missing explicit
    /// path is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => (PathBuf::from(p), true),
            _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        let base = if explicit || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        base.with_env_overrides()?.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Apply environment variables over the current values.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// arbitrary lookup; empty values count as unset.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("NEWS_API_URL") {
            self.official_url = v;
        }
        if let Some(v) = get("API_URL") {
            self.community_url = v;
        }
        if let Some(v) = get("API_PAGE_SIZE") {
            self.page_size = parse_num("page_size", &v)?;
        }
        if let Some(v) = get("BREAKING_NEWS_KEYWORDS") {
            self.breaking_keywords = v.split(',').map(str::to_string).collect();
        }
        if let Some(v) = get("IMPORTANT_LIKE_THRESHOLD") {
            self.important_like_threshold = parse_num("important_like_threshold", &v)?;
        }
        if let Some(v) = get("UPDATE_INTERVAL") {
            self.poll_interval_secs = parse_num("poll_interval_secs", &v)?;
        }
        if let Some(v) = get("REPORT_INTERVAL") {
            self.report_interval_secs = parse_num("report_interval_secs", &v)?;
        }
        if let Some(v) = get("REPORT_PAGE_SIZE") {
            self.report_max_items = parse_num("report_max_items", &v)?;
        }
        if let Some(v) = get("REPORT_MAX_AGE_SECS") {
            self.report_max_age_secs = parse_num("report_max_age_secs", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_num("fetch_timeout_secs", &v)?;
        }
        if let Some(v) = get("CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SITE_BASE_URL") {
            self.site_base_url = v;
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.discord_webhook_url = Some(v);
        }
        if let Some(v) = get("REPORT_WEBHOOK_URL") {
            self.report_webhook_url = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.gemini_model = v;
        }
        if let Some(v) = get("DELIVER_REGULAR") {
            self.deliver_regular = parse_bool("deliver_regular", &v)?;
        }
        if let Some(v) = get("DELIVERY_PACING_MS") {
            self.delivery_pacing_ms = parse_num("delivery_pacing_ms", &v)?;
        }
        if let Some(v) = get("METRICS_ADDR") {
            self.metrics_addr = Some(parse_num("metrics_addr", &v)?);
        }
        Ok(self)
    }

    /// Range checks + keyword cleanup (trim, drop empties, dedup).
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&self.page_size) {
            return Err(invalid("page_size", format!("{} not in 1..=100", self.page_size)));
        }
        for (field, v) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("report_interval_secs", self.report_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
        ] {
            if v == 0 {
                return Err(invalid(field, "must be > 0".into()));
            }
        }
        if self.report_max_items == 0 {
            return Err(invalid("report_max_items", "must be > 0".into()));
        }

        self.breaking_keywords = clean_list(std::mem::take(&mut self.breaking_keywords));
        if self.breaking_keywords.is_empty() {
            return Err(invalid("breaking_keywords", "empty after trimming".into()));
        }

        self.discord_webhook_url = self.discord_webhook_url.filter(|s| !s.trim().is_empty());
        self.report_webhook_url = self.report_webhook_url.filter(|s| !s.trim().is_empty());
        self.gemini_api_key = self.gemini_api_key.filter(|s| !s.trim().is_empty());
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn report_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.report_max_age_secs).unwrap_or(i64::MAX / 1_000))
    }

    pub fn delivery_pacing(&self) -> Duration {
        Duration::from_millis(self.delivery_pacing_ms)
    }

    /// Webhook for reports: its own, or the delivery one.
    pub fn effective_report_webhook(&self) -> Option<&str> {
        self.report_webhook_url
            .as_deref()
            .or(self.discord_webhook_url.as_deref())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn parse_num<T>(field: &'static str, v: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    v.parse::<T>().map_err(|e| invalid(field, format!("{v:?}: {e}")))
}

fn parse_bool(field: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(field, format!("{v:?} is not a boolean"))),
    }
}

/// Trim, drop empties, dedup; first occurrence keeps its position.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
