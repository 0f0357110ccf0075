//! Application-facing facade over the cache store and the sync orchestrator.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::models::{CacheItem, CachePage, Collection, ItemFilter, SyncStatus};
use crate::remote::RemoteSource;
use crate::store::CacheStore;
use crate::sync::{ProgressCallback, SubscriptionId, SyncOrchestrator};
use crate::{Error, Result};

/// What screens talk to: cache-first reads that quietly keep the cache fresh.
#[derive(Clone)]
pub struct Library {
    store: CacheStore,
    orchestrator: SyncOrchestrator,
}

impl Library {
    pub fn new(store: CacheStore, remote: Arc<dyn RemoteSource>, config: SyncConfig) -> Self {
        let store = store.with_freshness_window(config.freshness_window);
        let orchestrator = SyncOrchestrator::new(store.clone(), remote, config);
        Self {
            store,
            orchestrator,
        }
    }

    /// Open the cache at `path`.
    ///
    /// A file that is not a `SQLite` database is moved aside and the cache is
    /// recreated once; it only mirrors remote data plus local flags.
    pub fn open(
        path: impl AsRef<Path>,
        remote: Arc<dyn RemoteSource>,
        config: SyncConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let store = match CacheStore::open(path) {
            Ok(store) => store,
            Err(error) if is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Cache at {} is not a database ({error}); recreating it",
                    path.display()
                );
                quarantine_corrupted_db_file(path)?;
                CacheStore::open(path)?
            }
            Err(error) => return Err(error),
        };
        Ok(Self::new(store, remote, config))
    }

    /// In-memory library (primarily for tests).
    pub fn open_in_memory(remote: Arc<dyn RemoteSource>, config: SyncConfig) -> Result<Self> {
        Ok(Self::new(CacheStore::open_in_memory()?, remote, config))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub async fn initialize(&self) -> Result<()> {
        self.orchestrator.initialize().await
    }

    /// One page from the cache.
    ///
    /// Plain listings also request a background sync; search and category
    /// lookups only read.
    pub async fn fetch(
        &self,
        collection: Collection,
        page: usize,
        page_size: usize,
        filter: ItemFilter,
    ) -> Result<CachePage> {
        let is_search = filter.is_search();
        let result = self
            .store
            .fetch_page(collection, page, page_size, filter)
            .await?;
        if !is_search {
            self.orchestrator.request_background_sync();
        }
        Ok(result)
    }

    pub async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<CacheItem>> {
        self.store.get_by_id(collection, id).await
    }

    /// Set the favorite (vocabularies) or bookmark (resources) flag.
    pub async fn set_local_flag(&self, collection: Collection, id: &str, value: bool) -> Result<()> {
        self.store.set_local_flag(collection, id, value).await
    }

    pub fn get_status(&self) -> SyncStatus {
        self.orchestrator.get_status()
    }

    pub fn subscribe_progress(&self, collection: Collection, callback: ProgressCallback) -> SubscriptionId {
        self.orchestrator.subscribe_progress(collection, callback)
    }

    pub fn unsubscribe_progress(&self, id: SubscriptionId) -> bool {
        self.orchestrator.unsubscribe_progress(id)
    }

    pub fn set_connectivity(&self, online: bool) -> Option<JoinHandle<()>> {
        self.orchestrator.set_connectivity(online)
    }

    pub fn set_foreground(&self, foreground: bool) -> Option<JoinHandle<()>> {
        self.orchestrator.set_foreground(foreground)
    }
}

fn is_corrupted_db_error(error: &Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("file is not a database") || message.contains("file is encrypted")
}

/// Move a corrupt cache file (and its WAL sidecars) out of the way.
fn quarantine_corrupted_db_file(path: &Path) -> Result<()> {
    if path.exists() {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return Err(Error::InvalidInput(format!(
                "unusable cache path {}",
                path.display()
            )));
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let backup_path = path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));
        std::fs::rename(path, &backup_path)?;
        tracing::warn!("Moved {} to {}", path.display(), backup_path.display());
    }

    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = Path::new(&sidecar);
        if sidecar.exists() {
            std::fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}
