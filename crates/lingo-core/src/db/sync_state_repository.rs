//! Persisted sync state, stored in the local `settings` table

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Collection, PersistedSyncState};

const INITIAL_SYNC_DONE_KEY: &str = "initial_sync_done";
const LAST_SYNC_PREFIX: &str = "last_sync.";

/// Trait for persisted orchestrator state
pub trait SyncStateRepository {
    /// Load the persisted state, defaulting missing keys
    fn load(&self) -> Result<PersistedSyncState>;

    /// Record a successful sync of `collection` at `at` (Unix ms)
    fn save_last_sync(&self, collection: Collection, at: i64) -> Result<()>;

    /// Record that the first full sync completed
    fn mark_initial_sync_done(&self) -> Result<()>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn load(&self) -> Result<PersistedSyncState> {
        let mut state = PersistedSyncState::default();

        if let Some(value) = self.get_setting(INITIAL_SYNC_DONE_KEY)? {
            state.initial_sync_done = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        for collection in Collection::ALL {
            let key = format!("{LAST_SYNC_PREFIX}{collection}");
            let Some(value) = self.get_setting(&key)? else {
                continue;
            };
            match value.trim().parse::<i64>() {
                Ok(at) => {
                    state.last_sync.insert(collection, at);
                }
                Err(_) => tracing::warn!("Ignoring unparseable {key} value: {value}"),
            }
        }

        Ok(state)
    }

    fn save_last_sync(&self, collection: Collection, at: i64) -> Result<()> {
        self.set_setting(&format!("{LAST_SYNC_PREFIX}{collection}"), &at.to_string())
    }

    fn mark_initial_sync_done(&self) -> Result<()> {
        self.set_setting(INITIAL_SYNC_DONE_KEY, "true")
    }
}
