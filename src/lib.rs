// src/lib.rs
// Public library surface for the binary, dev tools and integration tests.

pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::classify::{ClassificationResult, Classifier, Tier};
pub use crate::config::RelayConfig;
pub use crate::ingest::types::{NewsItem, SourceKind};
pub use crate::pipeline::{CycleReport, Pipeline};
