//! Local cache store.
//!
//! Durable mirror of the remote collections plus local-only state. Reads go
//! straight to `SQLite`; every mutation goes through one [`WriteQueue`], so the
//! database never runs two writes at once.

mod write_queue;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use write_queue::WriteQueue;

use crate::config::DEFAULT_FRESHNESS_WINDOW;
use crate::db::{
    Database, ItemRepository, SqliteItemRepository, SqliteSyncStateRepository,
    SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    CacheItem, CachePage, Collection, ItemFilter, PersistedSyncState, QueryResult, SyncMetadata,
};
use crate::util::unix_millis_now;

/// Cloneable handle to the local cache.
#[derive(Clone)]
pub struct CacheStore {
    db: Database,
    writes: Arc<WriteQueue>,
    freshness_window: Duration,
}

impl CacheStore {
    /// Wrap an opened database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writes: Arc::new(WriteQueue::new()),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    /// Open (or create) the cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open an in-memory cache (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Set the age after which reads report `is_stale`.
    #[must_use]
    pub const fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Mutations queued or running.
    pub fn pending_writes(&self) -> usize {
        self.writes.pending()
    }

    /// Run a write on the connection after every earlier write finished.
    async fn write<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        self.writes.run(|| async move { db.call(op).await }).await
    }

    /// Insert or replace `items` by id in one transaction.
    ///
    /// Refreshes the collection's item count and last sync time in the same
    /// transaction. Existing local flags are kept.
    pub async fn upsert_items(&self, collection: Collection, items: Vec<CacheItem>) -> Result<usize> {
        let count = items.len();
        let written = self
            .write(move |conn| {
                SqliteItemRepository::new(conn).upsert(collection, &items, unix_millis_now())
            })
            .await?;
        tracing::debug!("Upserted {written}/{count} {collection} items");
        Ok(written)
    }

    /// All items matching `filter`, most recently updated first.
    pub async fn query(&self, collection: Collection, filter: ItemFilter) -> Result<QueryResult> {
        let window = self.freshness_window;
        self.db
            .call(move |conn| {
                let repo = SqliteItemRepository::new(conn);
                let items = repo.list(collection, &filter, None, 0)?;
                let is_stale = is_stale(repo.metadata(collection)?.as_ref(), window);
                Ok(QueryResult { items, is_stale })
            })
            .await
    }

    /// One zero-based page of items matching `filter`.
    pub async fn fetch_page(
        &self,
        collection: Collection,
        page: usize,
        page_size: usize,
        filter: ItemFilter,
    ) -> Result<CachePage> {
        if page_size == 0 {
            return Err(Error::InvalidInput("page_size must be positive".to_string()));
        }
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| Error::InvalidInput("page out of range".to_string()))?;
        let window = self.freshness_window;

        self.db
            .call(move |conn| {
                let repo = SqliteItemRepository::new(conn);
                let items = repo.list(collection, &filter, Some(page_size), offset)?;
                let total = repo.count(collection, &filter)?;
                let is_stale = is_stale(repo.metadata(collection)?.as_ref(), window);
                Ok(CachePage {
                    items,
                    total,
                    page,
                    page_size,
                    is_stale,
                })
            })
            .await
    }

    /// Point lookup; `Ok(None)` when the item is not cached.
    pub async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<CacheItem>> {
        let id = id.to_string();
        self.db
            .call(move |conn| SqliteItemRepository::new(conn).get(collection, &id))
            .await
    }

    /// Newest remote update timestamp, the delta-sync watermark.
    pub async fn max_update_timestamp(&self, collection: Collection) -> Result<Option<i64>> {
        self.db
            .call(move |conn| SqliteItemRepository::new(conn).max_remote_updated_at(collection))
            .await
    }

    /// Oldest remote update timestamp.
    pub async fn min_update_timestamp(&self, collection: Collection) -> Result<Option<i64>> {
        self.db
            .call(move |conn| SqliteItemRepository::new(conn).min_remote_updated_at(collection))
            .await
    }

    /// Set the favorite/bookmark flag and bump the item's update time.
    pub async fn set_local_flag(&self, collection: Collection, id: &str, value: bool) -> Result<()> {
        let id = id.to_string();
        self.write(move |conn| {
            SqliteItemRepository::new(conn).set_local_flag(collection, &id, value, unix_millis_now())
        })
        .await?;
        tracing::debug!("Set {} = {value} on {collection}", collection.local_flag_name());
        Ok(())
    }

    pub async fn is_empty(&self, collection: Collection) -> Result<bool> {
        self.db
            .call(move |conn| SqliteItemRepository::new(conn).is_empty(collection))
            .await
    }

    pub async fn metadata(&self, collection: Collection) -> Result<Option<SyncMetadata>> {
        self.db
            .call(move |conn| SqliteItemRepository::new(conn).metadata(collection))
            .await
    }

    /// Whether the collection's cache is missing or older than the freshness window.
    pub async fn is_stale(&self, collection: Collection) -> Result<bool> {
        let metadata = self.metadata(collection).await?;
        Ok(is_stale(metadata.as_ref(), self.freshness_window))
    }

    /// Load orchestrator state persisted by earlier runs.
    pub async fn load_sync_state(&self) -> Result<PersistedSyncState> {
        self.db
            .call(|conn| SqliteSyncStateRepository::new(conn).load())
            .await
    }

    /// Persist the last successful sync time of a collection.
    pub async fn record_last_sync(&self, collection: Collection, at: i64) -> Result<()> {
        self.write(move |conn| SqliteSyncStateRepository::new(conn).save_last_sync(collection, at))
            .await
    }

    /// Persist that the first full sync completed.
    pub async fn mark_initial_sync_done(&self) -> Result<()> {
        self.write(|conn| SqliteSyncStateRepository::new(conn).mark_initial_sync_done())
            .await
    }
}

fn is_stale(metadata: Option<&SyncMetadata>, window: Duration) -> bool {
    metadata.map_or(true, |metadata| {
        metadata.is_stale_at(unix_millis_now(), window)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Resource, Vocabulary};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn vocab(id: &str, word: &str, updated_at: i64) -> CacheItem {
        CacheItem::vocabulary(id, updated_at, updated_at, Vocabulary::new(word))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_reports_staleness() {
        let store = CacheStore::open_in_memory().unwrap();

        let empty = store
            .query(Collection::Vocabularies, ItemFilter::default())
            .await
            .unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.is_stale);

        store
            .upsert_items(Collection::Vocabularies, vec![vocab("v1", "chien", 10)])
            .await
            .unwrap();
        let fresh = store
            .query(Collection::Vocabularies, ItemFilter::default())
            .await
            .unwrap();
        assert_eq!(fresh.items.len(), 1);
        assert!(!fresh.is_stale);

        let strict = store.clone().with_freshness_window(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(strict.is_stale(Collection::Vocabularies).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_page() {
        let store = CacheStore::open_in_memory().unwrap();
        let items = (0..5).map(|i| vocab(&format!("v{i}"), "mot", i)).collect();
        store
            .upsert_items(Collection::Vocabularies, items)
            .await
            .unwrap();

        let page = store
            .fetch_page(Collection::Vocabularies, 1, 2, ItemFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "v2");
        assert!(page.has_more());

        let error = store
            .fetch_page(Collection::Vocabularies, 0, 0, ItemFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_by_id_and_timestamps() {
        let store = CacheStore::open_in_memory().unwrap();
        assert_eq!(
            store
                .max_update_timestamp(Collection::Resources)
                .await
                .unwrap(),
            None
        );

        store
            .upsert_items(
                Collection::Resources,
                vec![
                    CacheItem::resource("r1", 1, 40, Resource::new("Video")),
                    CacheItem::resource("r2", 2, 90, Resource::new("Article")),
                ],
            )
            .await
            .unwrap();

        let item = store
            .get_by_id(Collection::Resources, "r2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.primary_text(), "Article");
        assert!(store
            .get_by_id(Collection::Resources, "r9")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .max_update_timestamp(Collection::Resources)
                .await
                .unwrap(),
            Some(90)
        );
        assert_eq!(
            store
                .min_update_timestamp(Collection::Resources)
                .await
                .unwrap(),
            Some(40)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_write_does_not_block_queue() {
        let store = CacheStore::open_in_memory().unwrap();

        let wrong_kind = vec![CacheItem::resource("r1", 1, 1, Resource::new("Video"))];
        assert!(store
            .upsert_items(Collection::Vocabularies, wrong_kind)
            .await
            .is_err());

        store
            .upsert_items(Collection::Vocabularies, vec![vocab("v1", "chien", 1)])
            .await
            .unwrap();
        assert!(!store.is_empty(Collection::Vocabularies).await.unwrap());
        assert_eq!(store.pending_writes(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_writes_are_serialized() {
        let store = CacheStore::open_in_memory().unwrap();
        store
            .upsert_items(Collection::Vocabularies, vec![vocab("v0", "zero", 0)])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 1..=20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_items(Collection::Vocabularies, vec![vocab(&format!("v{i}"), "mot", i)])
                    .await
                    .unwrap();
                store
                    .set_local_flag(Collection::Vocabularies, "v0", i % 2 == 0)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let metadata = store
            .metadata(Collection::Vocabularies)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.item_count, 21);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_state_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("lingo.db");

        {
            let store = CacheStore::open(&path).unwrap();
            store
                .record_last_sync(Collection::Vocabularies, 1_234)
                .await
                .unwrap();
            store.mark_initial_sync_done().await.unwrap();
        }

        let store = CacheStore::open(&path).unwrap();
        let state = store.load_sync_state().await.unwrap();
        assert!(state.initial_sync_done);
        assert_eq!(state.latest_sync(), Some(1_234));
    }
}
