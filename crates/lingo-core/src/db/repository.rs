//! Cached item repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{CacheItem, Collection, ItemBody, ItemFilter, SyncMetadata};
use crate::util::{escape_like, normalize_text_option};

/// Trait for cached item storage operations
pub trait ItemRepository {
    /// Insert or update a batch of items in one transaction and refresh the
    /// collection's sync metadata
    fn upsert(&self, collection: Collection, items: &[CacheItem], now: i64) -> Result<usize>;

    /// Get an item by ID
    fn get(&self, collection: Collection, id: &str) -> Result<Option<CacheItem>>;

    /// List matching items, most recently updated first
    fn list(
        &self,
        collection: Collection,
        filter: &ItemFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<CacheItem>>;

    /// Count matching items
    fn count(&self, collection: Collection, filter: &ItemFilter) -> Result<usize>;

    /// Newest remote update timestamp in the cache
    fn max_remote_updated_at(&self, collection: Collection) -> Result<Option<i64>>;

    /// Oldest remote update timestamp in the cache
    fn min_remote_updated_at(&self, collection: Collection) -> Result<Option<i64>>;

    /// Set the local-only flag of one item
    fn set_local_flag(&self, collection: Collection, id: &str, value: bool, now: i64)
        -> Result<()>;

    /// Whether the collection has no cached items
    fn is_empty(&self, collection: Collection) -> Result<bool>;

    /// Sync metadata row for the collection
    fn metadata(&self, collection: Collection) -> Result<Option<SyncMetadata>>;
}

/// `SQLite` implementation of `ItemRepository`
pub struct SqliteItemRepository<'a> {
    conn: &'a Connection,
}

const ITEM_COLUMNS: &str = "id, body, created_at, updated_at, local_flag";

impl<'a> SqliteItemRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheItem> {
        let body: String = row.get(1)?;
        let body: ItemBody = serde_json::from_str(&body)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        Ok(CacheItem {
            id: row.get(0)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            local_flag: row.get::<_, i32>(4)? != 0,
            body,
        })
    }

    /// Build the WHERE clause and its parameters for a filter
    fn filter_clause(filter: &ItemFilter) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(search) = normalize_text_option(filter.search.clone()) {
            // Search columns are stored lower-cased; SQLite's LIKE only folds ASCII
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            clauses.push(
                "(search_primary LIKE ? ESCAPE '\\' OR search_secondary LIKE ? ESCAPE '\\')",
            );
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(category) = normalize_text_option(filter.category.clone()) {
            clauses.push("category = ?");
            values.push(Value::Text(category));
        }
        if let Some(flag) = filter.local_flag {
            clauses.push("local_flag = ?");
            values.push(Value::Integer(i64::from(flag)));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }

    fn ensure_kind(collection: Collection, items: &[CacheItem]) -> Result<()> {
        if let Some(item) = items.iter().find(|item| item.collection() != collection) {
            return Err(Error::InvalidInput(format!(
                "Item {} belongs to {}, not {collection}",
                item.id,
                item.collection()
            )));
        }
        Ok(())
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn upsert(&self, collection: Collection, items: &[CacheItem], now: i64) -> Result<usize> {
        Self::ensure_kind(collection, items)?;
        let table = collection.table_name();

        // Dropping the transaction without commit rolls the whole batch back
        let tx = self.conn.unchecked_transaction()?;
        {
            // The local flag is only written on insert, never on conflict
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {table} (
                    id, search_primary, search_secondary, category, body,
                    created_at, updated_at, remote_updated_at, local_flag
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    search_primary = excluded.search_primary,
                    search_secondary = excluded.search_secondary,
                    category = excluded.category,
                    body = excluded.body,
                    created_at = excluded.created_at,
                    updated_at = MAX({table}.updated_at, excluded.updated_at),
                    remote_updated_at = excluded.remote_updated_at
                 WHERE excluded.remote_updated_at >= {table}.remote_updated_at"
            ))?;

            for item in items {
                let body = serde_json::to_string(&item.body)?;
                stmt.execute(params![
                    item.id,
                    item.primary_text().to_lowercase(),
                    item.secondary_text().map(str::to_lowercase),
                    item.category(),
                    body,
                    item.created_at,
                    item.updated_at,
                    i32::from(item.local_flag),
                ])?;
            }
        }

        let item_count: i64 =
            tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        tx.execute(
            "INSERT INTO sync_metadata (collection, last_full_sync, item_count)
             VALUES (?, ?, ?)
             ON CONFLICT(collection) DO UPDATE SET
                last_full_sync = excluded.last_full_sync,
                item_count = excluded.item_count",
            params![collection.as_str(), now, item_count],
        )?;
        tx.commit()?;

        Ok(items.len())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<CacheItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM {} WHERE id = ?",
                    collection.table_name()
                ),
                params![id],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    fn list(
        &self,
        collection: Collection,
        filter: &ItemFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<CacheItem>> {
        let (where_clause, mut values) = Self::filter_clause(filter);
        values.push(Value::Integer(limit.map_or(-1, |limit| limit as i64)));
        values.push(Value::Integer(offset as i64));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM {}{where_clause}
             ORDER BY updated_at DESC, id ASC
             LIMIT ? OFFSET ?",
            collection.table_name()
        ))?;

        let items = stmt
            .query_map(params_from_iter(values), Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn count(&self, collection: Collection, filter: &ItemFilter) -> Result<usize> {
        let (where_clause, values) = Self::filter_clause(filter);
        let count = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {}{where_clause}",
                collection.table_name()
            ),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn max_remote_updated_at(&self, collection: Collection) -> Result<Option<i64>> {
        let max = self.conn.query_row(
            &format!(
                "SELECT MAX(remote_updated_at) FROM {}",
                collection.table_name()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn min_remote_updated_at(&self, collection: Collection) -> Result<Option<i64>> {
        let min = self.conn.query_row(
            &format!(
                "SELECT MIN(remote_updated_at) FROM {}",
                collection.table_name()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(min)
    }

    fn set_local_flag(
        &self,
        collection: Collection,
        id: &str,
        value: bool,
        now: i64,
    ) -> Result<()> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET local_flag = ?, updated_at = MAX(updated_at, ?) WHERE id = ?",
                collection.table_name()
            ),
            params![i32::from(value), now, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{collection}/{id}")));
        }

        Ok(())
    }

    fn is_empty(&self, collection: Collection) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {})",
                collection.table_name()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(!exists)
    }

    fn metadata(&self, collection: Collection) -> Result<Option<SyncMetadata>> {
        let metadata = self
            .conn
            .query_row(
                "SELECT last_full_sync, item_count FROM sync_metadata WHERE collection = ?",
                params![collection.as_str()],
                |row| {
                    Ok(SyncMetadata {
                        collection,
                        last_full_sync: row.get(0)?,
                        item_count: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }
}
