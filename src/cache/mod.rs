//! 报告缓存模块：查询规范化、缓存键派生与多层缓存存储。
//!
//! # Report Caching Module
//!
//! Caches generated trust reports so that repeated questions about the same
//! product are answered without running generation again.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`normalize`] | Free text to canonical query form |
//! | [`CacheKey`] | Composite or SHA-256 key from (normalized query, language) |
//! | [`CacheStore`] | Trait every tier implements |
//! | [`FileStore`] | Single-process store persisted as one JSON file |
//! | [`ProfileStore`] | Per-profile durable store with a query index |
//! | [`RemoteStore`] | Shared document-backed store with usage tracking |
//! | [`NullStore`] | No-op store for disabling caching |
//! | [`ReportCache`] | Best-effort façade with hit/miss counters |
//!
//! ## Example
//!
//! ```rust,no_run
//! use trust_cache::cache::{CacheConfig, CacheWrite, FileStore, ReportCache};
//!
//! # async fn demo() -> trust_cache::Result<()> {
//! let cache = ReportCache::new(CacheConfig::new(), Box::new(FileStore::new("ai_cache.json")));
//! if cache.lookup("gitlab.com", "en", None).await.is_none() {
//!     cache.store(&CacheWrite::new("GitLab", "report text", "model-x", "en")).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Entries expire after [`RETENTION`] (7 days) in every tier. The same query
//! in two languages is two entries.

mod backend;
mod document;
mod entry;
mod file;
mod key;
mod manager;
mod normalize;
mod profile;
mod remote;

pub use backend::{CacheStore, CacheWrite, NullStore};
pub use document::{DocumentPatch, DocumentStore, InMemoryDocumentStore, DEFAULT_BATCH_LIMIT};
pub use entry::{CacheEntry, StoreStats, UsageRecord, RETENTION};
pub use file::{FileStore, DEFAULT_MAX_ENTRIES};
pub use key::{composite_string, normalize_language, CacheKey, KeyScheme};
pub use manager::{CacheConfig, CacheCounters, ReportCache};
pub use normalize::normalize;
pub use profile::ProfileStore;
pub use remote::{RemoteStore, DEFAULT_RESPONSES_COLLECTION, DEFAULT_USAGE_COLLECTION};
