//! Read results served from the cache

use serde::{Deserialize, Serialize};

use super::item::CacheItem;

/// Items matching a query, plus whether the cache is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub items: Vec<CacheItem>,
    pub is_stale: bool,
}

/// One page of cached items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePage {
    pub items: Vec<CacheItem>,
    /// Number of items matching the filter across all pages
    pub total: usize,
    /// Zero-based page index
    pub page: usize,
    pub page_size: usize,
    pub is_stale: bool,
}

impl CachePage {
    /// Whether a further page exists.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        (self.page + 1) * self.page_size < self.total
    }
}
