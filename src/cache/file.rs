//! Single-process store persisted as one JSON collection on disk.

use super::backend::{CacheStore, CacheWrite};
use super::entry::{CacheEntry, StoreStats};
use super::key::{CacheKey, KeyScheme};
use super::normalize::normalize;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

type Collection = BTreeMap<String, CacheEntry>;

/// Whole-file store: every operation loads the collection, mutates it in
/// memory and rewrites it. Writers inside one process are serialized; the
/// rewrite goes through a temp file and a rename so readers never observe a
/// half-written collection.
pub struct FileStore {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_entries: DEFAULT_MAX_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Collection> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Collection::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::storage_with_context(
                    format!("unreadable cache collection: {e}"),
                    ErrorContext::new()
                        .with_source("file_store")
                        .with_details(self.path.display().to_string()),
                )
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Collection::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load for a write. A corrupt collection is replaced rather than
    /// blocking every future write.
    async fn load_for_write(&self) -> Result<Collection> {
        match self.load().await {
            Err(Error::Storage { message, .. }) => {
                warn!(path = %self.path.display(), %message, "discarding corrupt cache collection");
                Ok(Collection::new())
            }
            other => other,
        }
    }

    async fn persist(&self, entries: &Collection) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            // Best effort; the temp file is garbage either way.
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn evict_oldest(&self, entries: &mut Collection) {
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!(%key, "evicting oldest cache entry");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, query: &str, language: &str, _user: Option<&str>) -> Result<Option<String>> {
        let key = CacheKey::for_query(query, language, KeyScheme::Composite);
        let entries = self.load().await?;
        Ok(entries
            .get(key.as_str())
            .filter(|e| !e.is_expired_at(Utc::now()))
            .map(|e| e.response.clone()))
    }

    async fn set(&self, write: &CacheWrite<'_>) -> Result<()> {
        let normalized = normalize(write.query);
        let key = CacheKey::composite(&normalized, write.language);
        let entry = CacheEntry::new(
            normalized,
            key.language.clone(),
            write.query,
            write.response,
            write.model,
        );

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_for_write().await?;
        if !entries.contains_key(key.as_str()) {
            self.evict_oldest(&mut entries);
        }
        entries.insert(key.value, entry);
        self.persist(&entries).await
    }

    async fn clear_expired(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_for_write().await?;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self.load().await?;
        Ok(StoreStats::from_entries(entries.values(), Utc::now()))
    }

    async fn clear_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let removed = self.load_for_write().await?.len();
        self.persist(&Collection::new()).await?;
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn write(query: &'static str, response: &'static str, language: &'static str) -> CacheWrite<'static> {
        CacheWrite::new(query, response, "model-a", language)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("gitlab", "en", None).await.unwrap(), None);
        assert_eq!(store.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_set_persists_camel_case_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ai_cache.json");
        let store = FileStore::new(&path);
        store.set(&write("GitLab", "report", "en")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let entry = &raw["gitlab:en"];
        assert_eq!(entry["normalizedQuery"], "gitlab");
        assert_eq!(entry["originalQuery"], "GitLab");
        assert_eq!(entry["model"], "model-a");
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest_by_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let now = Utc::now();
        let mut seeded = Collection::new();
        for (i, name) in ["alpha", "bravo", "charlie"].iter().enumerate() {
            let entry = CacheEntry::new(*name, "en", *name, "r", "m")
                .created_at(now - ChronoDuration::minutes(10 - i as i64));
            seeded.insert(format!("{name}:en"), entry);
        }
        std::fs::write(&path, serde_json::to_vec(&seeded).unwrap()).unwrap();

        let store = FileStore::new(&path).with_max_entries(3);
        store.set(&write("delta", "r", "en")).await.unwrap();

        assert_eq!(store.get("alpha", "en", None).await.unwrap(), None);
        assert!(store.get("bravo", "en", None).await.unwrap().is_some());
        assert!(store.get("delta", "en", None).await.unwrap().is_some());
        assert_eq!(store.stats().await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_replacing_existing_key_does_not_evict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache.json")).with_max_entries(2);
        store.set(&write("alpha", "r1", "en")).await.unwrap();
        store.set(&write("bravo", "r1", "en")).await.unwrap();
        store.set(&write("alpha", "r2", "en")).await.unwrap();
        assert_eq!(store.get("alpha", "en", None).await.unwrap().as_deref(), Some("r2"));
        assert!(store.get("bravo", "en", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_reads_and_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(
            store.get("gitlab", "en", None).await,
            Err(Error::Storage { .. })
        ));
        store.set(&write("gitlab", "report", "en")).await.unwrap();
        assert_eq!(
            store.get("gitlab", "en", None).await.unwrap().as_deref(),
            Some("report")
        );
    }
}
