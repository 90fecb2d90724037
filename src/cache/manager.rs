//! Best-effort façade over one cache store.

use super::backend::{CacheStore, CacheWrite};
use super::entry::StoreStats;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Responses larger than this (bytes) are not cached.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entry_size: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl CacheCounters {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicCounters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
    fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a [`CacheStore`] so that caching can never fail a request.
///
/// Lookup failures degrade to a miss. Store failures come back as a
/// `Result` for the caller to log; they must not change what the user gets.
pub struct ReportCache {
    config: CacheConfig,
    store: Box<dyn CacheStore>,
    counters: Arc<AtomicCounters>,
}

impl ReportCache {
    pub fn new(config: CacheConfig, store: Box<dyn CacheStore>) -> Self {
        Self {
            config,
            store,
            counters: Arc::new(AtomicCounters::new()),
        }
    }

    pub async fn lookup(&self, query: &str, language: &str, user: Option<&str>) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        match self.store.get(query, language, user).await {
            Ok(Some(response)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(store = self.store.name(), language, "cache hit");
                Some(response)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(store = self.store.name(), language, "cache miss");
                None
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(store = self.store.name(), error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    pub async fn store(&self, write: &CacheWrite<'_>) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if write.response.len() > self.config.max_entry_size {
            debug!(bytes = write.response.len(), "response too large to cache");
            return Ok(());
        }
        match self.store.set(write).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(store = self.store.name(), language = write.language, "cache write");
                Ok(())
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Maintenance pass removing expired entries.
    pub async fn sweep(&self) -> Result<usize> {
        let removed = self.store.clear_expired().await?;
        info!(store = self.store.name(), removed, "cache sweep finished");
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.store.clear_all().await
    }

    pub async fn store_stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters.snapshot()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }
}
