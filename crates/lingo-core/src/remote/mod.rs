//! Remote data source boundary.
//!
//! The orchestrator only talks to [`RemoteSource`]. Implementations return
//! already-normalized [`CacheItem`]s; see [`normalize`] for the record shapes
//! they accept.

mod http;
mod memory;
pub mod normalize;

use async_trait::async_trait;

pub use http::HttpRemoteSource;
pub use memory::MemoryRemoteSource;

use crate::error::Result;
use crate::models::{CacheItem, Collection, PageCursor};

/// Paginated, timestamp-ordered queries over the remote collections.
///
/// Ordered queries may fail with [`crate::Error::QueryUnsupported`] (e.g. a
/// missing index); callers treat that as distinct from transport failures.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Up to `limit` items ordered by `created_at` descending (`id` descending
    /// on ties), strictly after `cursor` when given.
    async fn query_page(
        &self,
        collection: Collection,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Vec<CacheItem>>;

    /// Every item of the collection in one unordered page.
    async fn query_all(&self, collection: Collection) -> Result<Vec<CacheItem>>;

    /// Items with `updated_at > updated_after`, ordered by `updated_at` descending.
    async fn query_since(&self, collection: Collection, updated_after: i64)
        -> Result<Vec<CacheItem>>;

    /// Size of the collection, when the source can report it cheaply.
    async fn count(&self, _collection: Collection) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Whether `item` sorts strictly after `cursor` in `created_at DESC, id DESC` order.
pub(crate) fn is_after_cursor(item: &CacheItem, cursor: &PageCursor) -> bool {
    item.created_at < cursor.created_at
        || (item.created_at == cursor.created_at && item.id < cursor.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vocabulary;

    #[test]
    fn test_is_after_cursor() {
        let cursor = PageCursor {
            id: "m".to_string(),
            created_at: 100,
        };
        let item = |id: &str, created_at| CacheItem::vocabulary(id, created_at, 0, Vocabulary::new("x"));

        assert!(is_after_cursor(&item("z", 99), &cursor));
        assert!(is_after_cursor(&item("a", 100), &cursor));
        assert!(!is_after_cursor(&item("m", 100), &cursor));
        assert!(!is_after_cursor(&item("z", 100), &cursor));
        assert!(!is_after_cursor(&item("a", 101), &cursor));
    }
}
