//! Database migrations

use rusqlite::Connection;

use crate::error::Result;
use crate::models::Collection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Create one cache table per collection.
///
/// `updated_at` is the display timestamp (bumped by local flag changes);
/// `remote_updated_at` only ever holds the remote record's timestamp and
/// backs the delta-sync watermark.
fn item_table_statements(collection: Collection) -> String {
    let table = collection.table_name();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            search_primary TEXT NOT NULL,
            search_secondary TEXT,
            category TEXT,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            remote_updated_at INTEGER NOT NULL,
            local_flag INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at DESC, id ASC);
        CREATE INDEX IF NOT EXISTS idx_{table}_remote_updated ON {table}(remote_updated_at);
        CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table}(category);
        CREATE INDEX IF NOT EXISTS idx_{table}_flag ON {table}(local_flag);"
    )
}

/// Migration to version 1: item caches, sync metadata and local settings
fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut batch = String::from(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sync_metadata (
            collection TEXT PRIMARY KEY,
            last_full_sync INTEGER NOT NULL,
            item_count INTEGER NOT NULL
        );",
    );
    for collection in Collection::ALL {
        batch.push_str(&item_table_statements(collection));
    }
    batch.push_str("INSERT INTO schema_version (version) VALUES (1);");

    apply(conn, &batch)?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

/// Run a batch of statements atomically.
fn apply(conn: &Connection, batch: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(batch)?;
    tx.commit()?;
    Ok(())
}
