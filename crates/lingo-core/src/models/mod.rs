//! Data models for Lingo

mod collection;
mod item;
mod page;
mod sync;

pub use collection::Collection;
pub use item::{CacheItem, ItemBody, ItemFilter, PageCursor, Resource, Vocabulary};
pub use page::{CachePage, QueryResult};
pub use sync::{
    CollectionState, PersistedSyncState, SyncMetadata, SyncMode, SyncProgress, SyncStatus,
};
