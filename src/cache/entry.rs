//! Persisted records shared by every tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// How long an entry stays live. Identical across tiers.
pub const RETENTION: Duration = Duration::from_millis(604_800_000);

/// One cached report. Field names are camelCase on disk and on the wire so
/// every tier persists the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub normalized_query: String,
    pub language: String,
    pub original_query: String,
    pub response: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        normalized_query: impl Into<String>,
        language: impl Into<String>,
        original_query: impl Into<String>,
        response: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            normalized_query: normalized_query.into(),
            language: language.into(),
            original_query: original_query.into(),
            response: response.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(self.created_at).num_milliseconds();
        age_ms > RETENTION.as_millis() as i64
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Which cache entries a user has produced or read (shared tier only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    #[serde(default)]
    pub touched_entry_keys: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub expired: usize,
    pub valid: usize,
}

impl StoreStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>, now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.total += 1;
            if entry.is_expired_at(now) {
                stats.expired += 1;
            }
        }
        stats.valid = stats.total - stats.expired;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_retention_is_seven_days() {
        assert_eq!(RETENTION.as_secs(), 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry::new("gitlab", "en", "GitLab", "report", "m1")
            .created_at(now - ChronoDuration::days(7));
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + ChronoDuration::milliseconds(1)));
    }

    #[test]
    fn test_persisted_shape_is_camel_case() {
        let entry = CacheEntry::new("gitlab", "en", "GitLab", "report", "m1");
        let json = serde_json::to_value(&entry).unwrap();
        for field in [
            "normalizedQuery",
            "language",
            "originalQuery",
            "response",
            "model",
            "createdAt",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_stats_from_entries() {
        let now = Utc::now();
        let fresh = CacheEntry::new("a", "en", "a", "r", "m");
        let stale = CacheEntry::new("b", "en", "b", "r", "m").created_at(now - ChronoDuration::days(8));
        let stats = StoreStats::from_entries([&fresh, &stale], now);
        assert_eq!(stats, StoreStats { total: 2, expired: 1, valid: 1 });
    }
}
