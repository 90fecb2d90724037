//! Shared tier visible to every user and server instance.
//!
//! Entries live in a document collection under hashed ids so raw queries
//! never show up in storage identifiers. A second collection records which
//! users touched which entries; it is observational and never decides a hit.

use super::backend::{CacheStore, CacheWrite};
use super::document::{DocumentPatch, DocumentStore};
use super::entry::{CacheEntry, StoreStats, UsageRecord};
use super::key::{CacheKey, KeyScheme};
use super::normalize::normalize;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_RESPONSES_COLLECTION: &str = "responses";
pub const DEFAULT_USAGE_COLLECTION: &str = "usage";

pub struct RemoteStore {
    documents: Arc<dyn DocumentStore>,
    responses: String,
    usage: String,
}

impl RemoteStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            responses: DEFAULT_RESPONSES_COLLECTION.to_string(),
            usage: DEFAULT_USAGE_COLLECTION.to_string(),
        }
    }

    pub fn with_collections(mut self, responses: impl Into<String>, usage: impl Into<String>) -> Self {
        self.responses = responses.into();
        self.usage = usage.into();
        self
    }

    /// Record that `user_id` touched the entry at `key`. Repeating the call
    /// for the same pair leaves the record unchanged apart from its timestamp.
    pub async fn track_usage(&self, user_id: &str, key: &str) -> Result<()> {
        let patch = DocumentPatch::new()
            .set_field("userId", user_id)
            .set_field("lastUpdated", Utc::now().to_rfc3339())
            .union("touchedEntryKeys", key);
        self.documents.merge(&self.usage, user_id, &patch).await
    }

    pub async fn usage_for(&self, user_id: &str) -> Result<Option<UsageRecord>> {
        match self.documents.get(&self.usage, user_id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn track_usage_best_effort(&self, user: Option<&str>, key: &CacheKey) {
        let Some(user_id) = user else {
            return;
        };
        if let Err(e) = self.track_usage(user_id, key.as_str()).await {
            warn!(user = user_id, error = %e, "failed to record cache usage");
        }
    }

    /// Delete `ids` in chunks the document service accepts atomically. Each
    /// chunk commits on its own; a failing chunk stops the sweep.
    async fn delete_chunked(&self, ids: &[String]) -> Result<usize> {
        let chunk_size = self.documents.max_batch_size().max(1);
        let mut removed = 0;
        for chunk in ids.chunks(chunk_size) {
            match self.documents.delete_batch(&self.responses, chunk).await {
                Ok(n) => removed += n,
                Err(e) => {
                    warn!(removed, error = %e, "batch delete failed part way through");
                    return Err(e);
                }
            }
        }
        Ok(removed)
    }

    async fn entries(&self) -> Result<Vec<(String, CacheEntry)>> {
        let documents = self.documents.list(&self.responses).await?;
        let mut entries = Vec::with_capacity(documents.len());
        for (id, doc) in documents {
            match serde_json::from_value::<CacheEntry>(doc) {
                Ok(entry) => entries.push((id, entry)),
                Err(e) => debug!(%id, error = %e, "skipping malformed cache document"),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl CacheStore for RemoteStore {
    async fn get(&self, query: &str, language: &str, user: Option<&str>) -> Result<Option<String>> {
        let key = CacheKey::for_query(query, language, KeyScheme::Hashed);
        let Some(doc) = self.documents.get(&self.responses, key.as_str()).await? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_value(doc)?;
        if entry.is_expired() {
            return Ok(None);
        }
        self.track_usage_best_effort(user, &key).await;
        Ok(Some(entry.response))
    }

    async fn set(&self, write: &CacheWrite<'_>) -> Result<()> {
        let normalized = normalize(write.query);
        let key = CacheKey::hashed(&normalized, write.language);
        let entry = CacheEntry::new(
            normalized,
            key.language.clone(),
            write.query,
            write.response,
            write.model,
        );
        self.documents
            .put(&self.responses, key.as_str(), serde_json::to_value(&entry)?)
            .await?;
        self.track_usage_best_effort(write.user, &key).await;
        Ok(())
    }

    async fn clear_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries()
            .await?
            .into_iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(id, _)| id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self.delete_chunked(&expired).await?;
        info!(removed, store = self.documents.name(), "swept expired shared cache entries");
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries().await?;
        Ok(StoreStats::from_entries(entries.iter().map(|(_, e)| e), Utc::now()))
    }

    async fn clear_all(&self) -> Result<usize> {
        let ids: Vec<String> = self
            .documents
            .list(&self.responses)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        self.delete_chunked(&ids).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
