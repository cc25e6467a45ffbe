//! # Cache Store
//! Durable dedup state: the seen-id set, the last response fingerprint and a
//! few counters. Two JSON records live under the cache directory:
//!
//! - `news_cache.json`: seen ids + counters
//! - `last_response.json`: last fingerprint + when it was taken
//!
//! `filter_new` never mutates; only `commit` does. A caller can therefore
//! deliver items first and commit afterwards, which makes a crash in between
//! redeliver rather than lose.
//!
//! `reset` and `backup` are library-level maintenance operations; the service
//! exposes no operator command or route for them.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::ingest::types::NewsItem;
use crate::merge::{Fingerprint, MergedBatch};

pub const NEWS_CACHE_FILE: &str = "news_cache.json";
pub const LAST_RESPONSE_FILE: &str = "last_response.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheState {
    pub seen: HashSet<String>,
    pub fingerprint: Option<Fingerprint>,
    pub fingerprint_at: Option<DateTime<Utc>>,
    pub last_response_count: usize,
    pub total_processed: u64,
    pub last_update: Option<DateTime<Utc>>,
}

// --- on-disk records ---

#[derive(Debug, Serialize, Deserialize)]
struct NewsCacheRecord {
    news_ids: Vec<String>,
    total_processed: u64,
    #[serde(default)]
    unique_ids: u64,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LastResponseRecord {
    timestamp: Option<DateTime<Utc>>,
    response_hash: Option<Fingerprint>,
    #[serde(default)]
    news_count: usize,
}

/// Read-only counters for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_processed: u64,
    pub unique_ids: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub last_response_count: usize,
    pub cache_dir: PathBuf,
}

impl CacheState {
    /// Load both records. Missing files mean first run and yield an empty state.
    pub fn load(dir: &Path) -> Result<Self, CacheError> {
        let mut state = CacheState::default();

        if let Some(rec) = read_record::<NewsCacheRecord>(&dir.join(NEWS_CACHE_FILE))? {
            state.seen = rec.news_ids.into_iter().collect();
            state.total_processed = rec.total_processed;
            state.last_update = rec.last_update;
        }
        if let Some(rec) = read_record::<LastResponseRecord>(&dir.join(LAST_RESPONSE_FILE))? {
            state.fingerprint = rec.response_hash;
            state.fingerprint_at = rec.timestamp;
            state.last_response_count = rec.news_count;
        }
        Ok(state)
    }

    fn news_record(&self) -> NewsCacheRecord {
        let mut ids: Vec<String> = self.seen.iter().cloned().collect();
        ids.sort();
        NewsCacheRecord {
            unique_ids: ids.len() as u64,
            news_ids: ids,
            total_processed: self.total_processed,
            last_update: self.last_update,
        }
    }

    fn response_record(&self) -> LastResponseRecord {
        LastResponseRecord {
            timestamp: self.fingerprint_at,
            response_hash: self.fingerprint.clone(),
            news_count: self.last_response_count,
        }
    }
}

pub struct CacheStore {
    dir: PathBuf,
    state: CacheState,
}

impl CacheStore {
    /// Open the store, recovering from unreadable records by starting empty.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let state = match CacheState::load(&dir) {
            Ok(s) => {
                tracing::info!(
                    dir = %dir.display(),
                    seen = s.seen.len(),
                    "news cache loaded"
                );
                s
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    dir = %dir.display(),
                    "news cache unreadable, starting empty (already-seen items may be redelivered once)"
                );
                quarantine(&dir);
                CacheState::default()
            }
        };
        Self { dir, state }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.state.fingerprint.as_ref()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.state.seen.contains(id)
    }

    /// Items of `batch` whose id is not in the seen-set, in batch order.
    pub fn filter_new(&self, batch: &MergedBatch) -> Vec<NewsItem> {
        batch
            .items
            .iter()
            .filter(|it| !self.state.seen.contains(&it.id))
            .cloned()
            .collect()
    }

    /// Record `new_items` as seen and `batch`'s fingerprint as the latest, then
    /// persist. The in-memory state advances even when persisting fails so the
    /// running process never redelivers; the next successful commit rewrites
    /// both records in full.
    pub fn commit(
        &mut self,
        new_items: &[NewsItem],
        batch: &MergedBatch,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut added = 0u64;
        for it in new_items {
            if self.state.seen.insert(it.id.clone()) {
                added += 1;
            }
        }
        if added > 0 {
            self.state.total_processed += added;
            self.state.last_update = Some(now);
        }
        self.state.fingerprint = Some(batch.fingerprint.clone());
        self.state.fingerprint_at = Some(now);
        self.state.last_response_count = batch.len();

        self.persist()
    }

    /// Seen ids first: if only that write lands, the next cycle re-filters
    /// against a complete seen-set and finds nothing new.
    fn persist(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_record(&self.dir.join(NEWS_CACHE_FILE), &self.state.news_record())?;
        write_record(&self.dir.join(LAST_RESPONSE_FILE), &self.state.response_record())?;
        Ok(())
    }

    /// Administrative: forget every seen id and the fingerprint.
    pub fn reset(&mut self, actor: &str) -> Result<(), CacheError> {
        let before = self.state.seen.len();
        self.state = CacheState::default();
        for name in [NEWS_CACHE_FILE, LAST_RESPONSE_FILE] {
            let path = self.dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        tracing::warn!(target: "audit", actor, dropped_ids = before, "news cache reset");
        Ok(())
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            total_processed: self.state.total_processed,
            unique_ids: self.state.seen.len(),
            last_update: self.state.last_update,
            last_response_at: self.state.fingerprint_at,
            last_response_count: self.state.last_response_count,
            cache_dir: self.dir.clone(),
        }
    }

    /// Copy both records into `<backup_root>/cache_backup_<timestamp>/`.
    pub fn backup(&self, backup_root: &Path, now: DateTime<Utc>) -> Result<PathBuf, CacheError> {
        let target = backup_root.join(format!("cache_backup_{}", now.format("%Y%m%d_%H%M%S")));
        fs::create_dir_all(&target).map_err(|source| CacheError::Io {
            path: target.clone(),
            source,
        })?;
        for name in [NEWS_CACHE_FILE, LAST_RESPONSE_FILE] {
            let from = self.dir.join(name);
            if !from.exists() {
                continue;
            }
            fs::copy(&from, target.join(name)).map_err(|source| CacheError::Io {
                path: from.clone(),
                source,
            })?;
        }
        tracing::info!(path = %target.display(), "news cache backed up");
        Ok(target)
    }
}

fn read_record<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, CacheError> {
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&s)
        .map(Some)
        .map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Write via a temp file + rename so a record is never half-written.
fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_vec_pretty(value).map_err(|e| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).map_err(io_err)?;
    f.write_all(&json).map_err(io_err)?;
    f.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Move unreadable records aside so the next commit starts clean.
fn quarantine(dir: &Path) {
    for name in [NEWS_CACHE_FILE, LAST_RESPONSE_FILE] {
        let path = dir.join(name);
        if path.exists() {
            let aside = path.with_extension("json.corrupt");
            if let Err(e) = fs::rename(&path, &aside) {
                tracing::warn!(error = %e, path = %path.display(), "could not move corrupt cache record aside");
            }
        }
    }
}
