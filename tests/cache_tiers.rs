//! The three tiers must agree on the cache contract.

use chrono::{Duration, Utc};
use std::sync::Arc;
use trust_cache::cache::{
    CacheEntry, CacheKey, CacheStore, CacheWrite, DocumentStore, FileStore, InMemoryDocumentStore,
    ProfileStore, RemoteStore, DEFAULT_RESPONSES_COLLECTION,
};

async fn assert_language_isolation(store: &dyn CacheStore) {
    store
        .set(&CacheWrite::new("GitLab", "r1", "model-a", "en"))
        .await
        .unwrap();
    assert_eq!(store.get("gitlab", "en", None).await.unwrap().as_deref(), Some("r1"));
    assert_eq!(store.get("gitlab", "ru", None).await.unwrap(), None, "{}", store.name());
}

async fn assert_upsert_replaces(store: &dyn CacheStore) {
    store
        .set(&CacheWrite::new("Slack", "first", "model-a", "en"))
        .await
        .unwrap();
    store
        .set(&CacheWrite::new("https://www.slack.com/", "second", "model-b", "en"))
        .await
        .unwrap();
    assert_eq!(
        store.get("slack", "en", None).await.unwrap().as_deref(),
        Some("second"),
        "{}",
        store.name()
    );
    assert_eq!(store.stats().await.unwrap().total, 2, "{}", store.name());
}

async fn assert_contract(store: &dyn CacheStore) {
    assert_language_isolation(store).await;
    assert_upsert_replaces(store).await;
    assert_eq!(store.clear_all().await.unwrap(), 2);
    assert_eq!(store.get("gitlab", "en", None).await.unwrap(), None);
}

fn stale_entry(query: &str) -> CacheEntry {
    CacheEntry::new(query, "en", query, "stale report", "model-a")
        .created_at(Utc::now() - Duration::days(8))
}

#[tokio::test]
async fn file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("ai_cache.json"));
    assert_contract(&store).await;
}

#[tokio::test]
async fn profile_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::open(dir.path(), "profile-1").await.unwrap();
    assert_contract(&store).await;
}

#[tokio::test]
async fn remote_store_contract() {
    let store = RemoteStore::new(Arc::new(InMemoryDocumentStore::new()));
    assert_contract(&store).await;
}

#[tokio::test]
async fn file_store_expiration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ai_cache.json");
    let mut seeded = std::collections::BTreeMap::new();
    seeded.insert("zoom:en".to_string(), stale_entry("zoom"));
    std::fs::write(&path, serde_json::to_vec(&seeded).unwrap()).unwrap();

    let store = FileStore::new(&path);
    store
        .set(&CacheWrite::new("slack", "fresh", "model-a", "en"))
        .await
        .unwrap();

    assert_eq!(store.get("zoom", "en", None).await.unwrap(), None);
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.total, stats.expired, stats.valid), (2, 1, 1));

    assert_eq!(store.clear_expired().await.unwrap(), 1);
    assert_eq!(store.stats().await.unwrap().total, 1);
    assert_eq!(store.clear_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn remote_store_expiration_sweeps_in_chunks() {
    let documents = Arc::new(InMemoryDocumentStore::new().with_batch_limit(3));
    for i in 0..7 {
        let query = format!("tool {i}");
        let key = CacheKey::hashed(&query, "en");
        documents
            .put(
                DEFAULT_RESPONSES_COLLECTION,
                key.as_str(),
                serde_json::to_value(stale_entry(&query)).unwrap(),
            )
            .await
            .unwrap();
    }
    let store = RemoteStore::new(documents.clone());
    store
        .set(&CacheWrite::new("fresh tool", "r", "model-a", "en"))
        .await
        .unwrap();

    assert_eq!(store.get("tool 3", "en", None).await.unwrap(), None);
    assert_eq!(store.stats().await.unwrap().expired, 7);

    assert_eq!(store.clear_expired().await.unwrap(), 7);
    assert_eq!(documents.batch_commits(), 3);
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.total, stats.valid), (1, 1));
}

#[tokio::test]
async fn remote_usage_is_append_only_and_never_gates_hits() {
    let store = RemoteStore::new(Arc::new(InMemoryDocumentStore::new()));
    store
        .set(&CacheWrite::new("GitLab", "report", "model-a", "en").with_user(Some("alice")))
        .await
        .unwrap();
    store
        .set(&CacheWrite::new("Notion", "report", "model-a", "en").with_user(Some("alice")))
        .await
        .unwrap();

    // Another user hits alice's entry without any usage record of their own.
    assert_eq!(
        store.get("gitlab.com", "en", Some("bob")).await.unwrap().as_deref(),
        Some("report")
    );
    store.track_usage("alice", &CacheKey::hashed("gitlab", "en").value).await.unwrap();

    let alice = store.usage_for("alice").await.unwrap().unwrap();
    assert_eq!(alice.touched_entry_keys.len(), 2);
    assert!(alice
        .touched_entry_keys
        .contains(&CacheKey::hashed("notion", "en").value));
    let bob = store.usage_for("bob").await.unwrap().unwrap();
    assert_eq!(bob.touched_entry_keys.len(), 1);
}
