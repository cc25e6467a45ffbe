//! Error taxonomy shared by the poll cycle and its collaborators.

use std::path::PathBuf;

/// One source fetch failed. The caller decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache record {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Failure of a whole poll cycle. Never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("both sources failed (official: {official}; community: {community})")]
    AllSourcesFailed {
        official: FetchError,
        community: FetchError,
    },

    #[error("cycle cancelled by shutdown")]
    Cancelled,

    /// Items were delivered but the seen-set could not be made durable.
    #[error("delivered {delivered} item(s) but persisting the cache failed: {source}")]
    Persist {
        delivered: usize,
        #[source]
        source: CacheError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FetchError {
    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Status(_) => "status",
            FetchError::Malformed(_) => "malformed",
            FetchError::Transport(_) => "transport",
        }
    }
}

