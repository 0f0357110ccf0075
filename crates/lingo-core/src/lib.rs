//! lingo-core - Core library for Lingo
//!
//! Offline-first cache of the vocabulary and resource collections: a local
//! `SQLite` store with serialized writes, and a sync orchestrator that keeps it
//! in step with the remote source through chunked full syncs and incremental
//! delta syncs.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod store;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{CacheItem, CachePage, Collection, ItemFilter, SyncProgress, SyncStatus};
pub use remote::{HttpRemoteSource, MemoryRemoteSource, RemoteSource};
pub use services::Library;
pub use store::CacheStore;
pub use sync::{SyncOptions, SyncOrchestrator};
