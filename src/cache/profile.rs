//! Durable store scoped to one client profile.
//!
//! Records are addressed by composite key, and a secondary index maps each
//! normalized query to the keys stored under it, so a lookup only needs the
//! normalized query. The language filter runs after the index lookup.

use super::backend::{CacheStore, CacheWrite};
use super::entry::{CacheEntry, StoreStats};
use super::key::{normalize_language, CacheKey};
use super::normalize::normalize;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const SNAPSHOT_FILE: &str = "responses.json";

#[derive(Debug, Clone, Default)]
struct ProfileState {
    records: HashMap<String, CacheEntry>,
    by_query: HashMap<String, BTreeSet<String>>,
}

impl ProfileState {
    fn from_entries(entries: Vec<CacheEntry>) -> Self {
        let mut state = Self::default();
        for entry in entries {
            let key = CacheKey::composite(&entry.normalized_query, &entry.language);
            state.upsert(key.value, entry);
        }
        state
    }

    fn upsert(&mut self, key: String, entry: CacheEntry) {
        self.by_query
            .entry(entry.normalized_query.clone())
            .or_default()
            .insert(key.clone());
        self.records.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.records.remove(key)?;
        if let Some(keys) = self.by_query.get_mut(&entry.normalized_query) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_query.remove(&entry.normalized_query);
            }
        }
        Some(entry)
    }

    fn by_normalized_query<'a>(
        &'a self,
        normalized_query: &str,
    ) -> impl Iterator<Item = &'a CacheEntry> + 'a {
        self.by_query
            .get(normalized_query)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.records.get(key))
    }

    fn lookup(&self, normalized_query: &str, language: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.by_normalized_query(normalized_query)
            .filter(|e| e.language == language)
            .find(|e| !e.is_expired_at(now))
    }

    fn snapshot(&self) -> Vec<&CacheEntry> {
        let mut entries: Vec<&CacheEntry> = self.records.values().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        entries
    }
}

/// Store private to one profile; never shared between users.
pub struct ProfileStore {
    profile_id: String,
    path: PathBuf,
    state: RwLock<ProfileState>,
}

impl ProfileStore {
    /// Open (or create) the store for `profile_id` under `root`.
    pub async fn open(root: impl AsRef<Path>, profile_id: &str) -> Result<Self> {
        validate_profile_id(profile_id)?;
        let path = root.as_ref().join(profile_id).join(SNAPSHOT_FILE);
        let entries: Vec<CacheEntry> = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                // Replaced by the next successful write.
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "discarding unreadable profile snapshot"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(profile = profile_id, entries = entries.len(), "opened profile store");
        Ok(Self {
            profile_id: profile_id.to_string(),
            path,
            state: RwLock::new(ProfileState::from_entries(entries)),
        })
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Every live entry stored under `normalized_query`, across languages.
    pub async fn find_by_query(&self, normalized_query: &str) -> Vec<CacheEntry> {
        let now = Utc::now();
        let state = self.state.read().await;
        state
            .by_normalized_query(normalized_query)
            .filter(|e| !e.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Persist `candidate`, then install it as the live state. On failure the
    /// live state is left as it was, so memory never runs ahead of disk.
    async fn commit(&self, state: &mut ProfileState, candidate: ProfileState) -> Result<()> {
        self.persist(&candidate).await?;
        *state = candidate;
        Ok(())
    }

    async fn persist(&self, state: &ProfileState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(&state.snapshot())?;
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn validate_profile_id(profile_id: &str) -> Result<()> {
    let valid = !profile_id.is_empty()
        && profile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::validation_with_context(
            "profile id must be non-empty ASCII alphanumerics, '-' or '_'",
            ErrorContext::new()
                .with_field_path("profile_id")
                .with_details(profile_id.to_string()),
        ))
    }
}

#[async_trait]
impl CacheStore for ProfileStore {
    async fn get(&self, query: &str, language: &str, _user: Option<&str>) -> Result<Option<String>> {
        let normalized = normalize(query);
        let language = normalize_language(language);
        let state = self.state.read().await;
        Ok(state
            .lookup(&normalized, &language, Utc::now())
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
        let mut state = self.state.write().await;
        let mut candidate = state.clone();
        candidate.upsert(key.value, entry);
        self.commit(&mut state, candidate).await
    }

    async fn clear_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .records
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let mut candidate = state.clone();
        for key in &expired {
            candidate.remove(key);
        }
        self.commit(&mut state, candidate).await?;
        Ok(expired.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        Ok(StoreStats::from_entries(state.records.values(), Utc::now()))
    }

    async fn clear_all(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let removed = state.records.len();
        self.commit(&mut state, ProfileState::default()).await?;
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "profile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_index_tracks_languages_for_one_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path(), "alice").await.unwrap();
        store
            .set(&CacheWrite::new("GitLab", "en report", "m", "en"))
            .await
            .unwrap();
        store
            .set(&CacheWrite::new("gitlab.com", "ru report", "m", "ru"))
            .await
            .unwrap();

        let mut languages: Vec<String> = store
            .find_by_query("gitlab")
            .await
            .into_iter()
            .map(|e| e.language)
            .collect();
        languages.sort();
        assert_eq!(languages, vec!["en", "ru"]);
        assert_eq!(
            store.get("GITLAB", "ru", None).await.unwrap().as_deref(),
            Some("ru report")
        );
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ProfileStore::open(dir.path(), "alice").await.unwrap();
            store
                .set(&CacheWrite::new("Slack", "report", "m", "en"))
                .await
                .unwrap();
        }
        let reopened = ProfileStore::open(dir.path(), "alice").await.unwrap();
        assert_eq!(
            reopened.get("slack", "en", None).await.unwrap().as_deref(),
            Some("report")
        );
        assert_eq!(reopened.find_by_query("slack").await.len(), 1);
    }

    #[tokio::test]
    async fn test_profiles_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let alice = ProfileStore::open(dir.path(), "alice").await.unwrap();
        let bob = ProfileStore::open(dir.path(), "bob").await.unwrap();
        alice
            .set(&CacheWrite::new("zoom", "report", "m", "en"))
            .await
            .unwrap();
        assert_eq!(bob.get("zoom", "en", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sweep_updates_index() {
        let dir = tempfile::tempdir().unwrap();
        let profile_dir = dir.path().join("alice");
        std::fs::create_dir_all(&profile_dir).unwrap();
        let stale = CacheEntry::new("zoom", "en", "Zoom", "old", "m")
            .created_at(Utc::now() - ChronoDuration::days(9));
        std::fs::write(
            profile_dir.join(SNAPSHOT_FILE),
            serde_json::to_vec(&vec![stale]).unwrap(),
        )
        .unwrap();

        let store = ProfileStore::open(dir.path(), "alice").await.unwrap();
        assert_eq!(store.get("zoom", "en", None).await.unwrap(), None);
        assert_eq!(store.stats().await.unwrap().expired, 1);
        assert_eq!(store.clear_expired().await.unwrap(), 1);
        assert!(store.find_by_query("zoom").await.is_empty());
        assert_eq!(store.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_opens_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("alice").join(SNAPSHOT_FILE);
        std::fs::create_dir_all(snapshot.parent().unwrap()).unwrap();
        std::fs::write(&snapshot, b"{truncated").unwrap();

        let store = ProfileStore::open(dir.path(), "alice").await.unwrap();
        assert_eq!(store.stats().await.unwrap().total, 0);
        store
            .set(&CacheWrite::new("GitLab", "report", "m", "en"))
            .await
            .unwrap();
        assert_eq!(
            store.get("gitlab", "en", None).await.unwrap().as_deref(),
            Some("report")
        );

        let reopened = ProfileStore::open(dir.path(), "alice").await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path(), "alice").await.unwrap();
        store
            .set(&CacheWrite::new("Slack", "report", "m", "en"))
            .await
            .unwrap();

        // A directory in place of the snapshot makes every rename fail.
        let snapshot = dir.path().join("alice").join(SNAPSHOT_FILE);
        std::fs::remove_file(&snapshot).unwrap();
        std::fs::create_dir_all(&snapshot).unwrap();

        assert!(store.clear_all().await.is_err());
        assert_eq!(
            store.get("slack", "en", None).await.unwrap().as_deref(),
            Some("report")
        );
        assert!(store
            .set(&CacheWrite::new("Zoom", "report", "m", "en"))
            .await
            .is_err());
        assert_eq!(store.get("zoom", "en", None).await.unwrap(), None);
        assert_eq!(store.stats().await.unwrap().total, 1);

        let leftovers = std::fs::read_dir(dir.path().join("alice")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_profile_ids() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["", "../escape", "a/b", "a b"] {
            assert!(matches!(
                ProfileStore::open(dir.path(), bad).await,
                Err(Error::Validation { .. })
            ));
        }
    }
}
