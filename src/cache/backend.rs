//! Cache store contract.

use super::entry::StoreStats;
use crate::Result;
use async_trait::async_trait;

/// Everything a backend needs to write one entry.
#[derive(Debug, Clone, Copy)]
pub struct CacheWrite<'a> {
    pub query: &'a str,
    pub response: &'a str,
    pub model: &'a str,
    pub language: &'a str,
    /// Acting user, recorded by tiers that track usage.
    pub user: Option<&'a str>,
}

impl<'a> CacheWrite<'a> {
    pub fn new(query: &'a str, response: &'a str, model: &'a str, language: &'a str) -> Self {
        Self {
            query,
            response,
            model,
            language,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<&'a str>) -> Self {
        self.user = user;
        self
    }
}

/// A tier holding generated reports.
///
/// Implementations normalize the raw query themselves (through
/// [`crate::cache::normalize`]) so callers always pass user input verbatim.
/// Entries older than [`crate::cache::RETENTION`] are never returned by
/// [`CacheStore::get`], whether or not they were swept yet.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, query: &str, language: &str, user: Option<&str>) -> Result<Option<String>>;
    /// Upsert; a prior entry for the same key is fully replaced.
    async fn set(&self, write: &CacheWrite<'_>) -> Result<()>;
    /// Delete expired entries, returning how many were removed.
    async fn clear_expired(&self) -> Result<usize>;
    async fn stats(&self) -> Result<StoreStats>;
    async fn clear_all(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// Store used when caching is switched off.
pub struct NullStore;
impl NullStore {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _: &str, _: &str, _: Option<&str>) -> Result<Option<String>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheWrite<'_>) -> Result<()> {
        Ok(())
    }
    async fn clear_expired(&self) -> Result<usize> {
        Ok(0)
    }
    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }
    async fn clear_all(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
