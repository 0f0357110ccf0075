//! Database layer for Lingo

mod connection;
mod migrations;
mod repository;
mod sync_state_repository;

pub use connection::Database;
pub use repository::{ItemRepository, SqliteItemRepository};
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};
