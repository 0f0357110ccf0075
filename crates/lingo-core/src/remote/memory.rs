//! In-process remote source, backed by a JSON dump or items pushed by tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::normalize::normalize_records;
use super::{is_after_cursor, RemoteSource};
use crate::error::{Error, Result};
use crate::models::{CacheItem, Collection, PageCursor};

/// Remote source holding every collection in memory.
#[derive(Debug, Default)]
pub struct MemoryRemoteSource {
    items: RwLock<HashMap<Collection, Vec<CacheItem>>>,
}

impl MemoryRemoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dump shaped like `{ "vocabularies": [...], "resources": [...] }`.
    ///
    /// Records go through the same normalization as HTTP responses.
    pub fn from_json(payload: &str) -> Result<Self> {
        let dump: HashMap<String, Vec<Value>> = serde_json::from_str(payload)?;
        let source = Self::new();
        for (name, records) in dump {
            let collection: Collection = name.parse()?;
            for item in normalize_records(collection, &records) {
                source.insert(item)?;
            }
        }
        Ok(source)
    }

    /// Read a dump file, see [`Self::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let payload = std::fs::read_to_string(path)?;
        Self::from_json(&payload)
    }

    /// Insert or replace an item by id.
    pub fn insert(&self, item: CacheItem) -> Result<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        let collection = items.entry(item.collection()).or_default();
        match collection.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => collection.push(item),
        }
        Ok(())
    }

    /// Number of items held for a collection.
    pub fn len(&self, collection: Collection) -> Result<usize> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.get(&collection).map_or(0, Vec::len))
    }

    fn snapshot(&self, collection: Collection) -> Result<Vec<CacheItem>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.get(&collection).cloned().unwrap_or_default())
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Remote("In-memory source lock poisoned".to_string())
}

#[async_trait]
impl RemoteSource for MemoryRemoteSource {
    async fn query_page(
        &self,
        collection: Collection,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Vec<CacheItem>> {
        let mut items = self.snapshot(collection)?;
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(items
            .into_iter()
            .filter(|item| cursor.map_or(true, |cursor| is_after_cursor(item, cursor)))
            .take(limit)
            .collect())
    }

    async fn query_all(&self, collection: Collection) -> Result<Vec<CacheItem>> {
        self.snapshot(collection)
    }

    async fn query_since(
        &self,
        collection: Collection,
        updated_after: i64,
    ) -> Result<Vec<CacheItem>> {
        let mut items: Vec<CacheItem> = self
            .snapshot(collection)?
            .into_iter()
            .filter(|item| item.updated_at > updated_after)
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(items)
    }

    async fn count(&self, collection: Collection) -> Result<Option<usize>> {
        self.len(collection).map(Some)
    }
}
