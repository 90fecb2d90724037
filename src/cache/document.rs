//! Document database contract used by the shared tier.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Largest number of writes a document service accepts in one atomic batch.
pub const DEFAULT_BATCH_LIMIT: usize = 500;

/// Partial update: plain field assignments plus set-like array unions.
/// Applying it to a missing document creates the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentPatch {
    pub set: Map<String, Value>,
    #[serde(rename = "arrayUnion")]
    pub array_union: BTreeMap<String, Vec<Value>>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn union(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.array_union.entry(field.into()).or_default().push(value.into());
        self
    }

    /// Merge into `document`, turning it into an object if it is not one.
    pub fn apply(&self, document: &mut Value) {
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        let Some(fields) = document.as_object_mut() else {
            return;
        };
        for (field, value) in &self.set {
            fields.insert(field.clone(), value.clone());
        }
        for (field, values) in &self.array_union {
            let slot = fields
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;
    /// Replace-or-insert a whole document.
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<()>;
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>>;
    /// Delete up to [`DocumentStore::max_batch_size`] documents atomically.
    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<usize>;
    async fn merge(&self, collection: &str, id: &str, patch: &DocumentPatch) -> Result<()>;
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_LIMIT
    }
    fn name(&self) -> &'static str;
}

type Collections = HashMap<String, HashMap<String, Value>>;

/// In-process document store with the same batch limit a remote service
/// enforces.
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
    batch_limit: usize,
    batches: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            batch_limit: DEFAULT_BATCH_LIMIT,
            batches: AtomicUsize::new(0),
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Number of batch commits performed so far.
    pub fn batch_commits(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    fn poisoned() -> Error {
        Error::storage_with_context(
            "document store lock poisoned",
            ErrorContext::new().with_source("memory_documents"),
        )
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections.read().map_err(|_| Self::poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections.write().map_err(|_| Self::poisoned())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .read()?
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .read()?
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.len() > self.batch_limit {
            return Err(Error::validation_with_context(
                format!("batch of {} exceeds limit {}", ids.len(), self.batch_limit),
                ErrorContext::new().with_source("memory_documents"),
            ));
        }
        let mut collections = self.write()?;
        let removed = match collections.get_mut(collection) {
            Some(docs) => ids.iter().filter(|id| docs.remove(*id).is_some()).count(),
            None => 0,
        };
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    async fn merge(&self, collection: &str, id: &str, patch: &DocumentPatch) -> Result<()> {
        let mut collections = self.write()?;
        let document = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        patch.apply(document);
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
